//! Exclude-pattern matching
//!
//! Patterns use doublestar glob semantics evaluated against forward-slash
//! relative paths: `*` matches within one path segment, `**` crosses segment
//! boundaries, `?` matches a single non-separator character, and `[class]`
//! matches a character class. Patterns are anchored at the start of the
//! relative path; there is no implicit leading `**/`.
//!
//! Callers checking a directory append `/` to the relative path first, so a
//! pattern like `foo/**` also covers the directory `foo` itself. The local
//! walk uses that to skip descent into excluded trees.

use crate::error::{ConfigError, ConfigResult};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Compiled set of exclude patterns
///
/// A path is excluded iff any configured pattern matches it.
#[derive(Debug)]
pub struct ExcludeFilter {
    globs: GlobSet,
    patterns: Vec<String>,
}

impl Default for ExcludeFilter {
    fn default() -> Self {
        Self {
            globs: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }
}

impl ExcludeFilter {
    /// Compile a set of exclude patterns
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> ConfigResult<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            // literal_separator keeps `*` and `?` from crossing `/`,
            // which is what doublestar does
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|source| ConfigError::InvalidExcludePattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        let globs = builder
            .build()
            .map_err(|source| ConfigError::InvalidExcludePattern {
                pattern: kept.join(", "),
                source,
            })?;

        Ok(Self {
            globs,
            patterns: kept,
        })
    }

    /// True iff any pattern matches the given relative path
    ///
    /// `rel_path` is forward-slash and relative to the sync root. Directory
    /// callers must append `/` before calling.
    pub fn is_excluded(&self, rel_path: &str) -> bool {
        !self.patterns.is_empty() && self.globs.is_match(rel_path)
    }

    /// Number of configured patterns
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when no patterns are configured
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The patterns this filter was built from
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> ExcludeFilter {
        ExcludeFilter::new(patterns).unwrap()
    }

    #[test]
    fn test_empty_filter_matches_nothing() {
        let f = ExcludeFilter::new::<&str>(&[]).unwrap();
        assert!(!f.is_excluded("anything"));
        assert!(!f.is_excluded(""));
    }

    #[test]
    fn test_literal_match_is_anchored() {
        let f = filter(&["airflow.cfg"]);
        assert!(f.is_excluded("airflow.cfg"));
        // no implicit leading **/
        assert!(!f.is_excluded("nested/airflow.cfg"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let f = filter(&["*.pyc"]);
        assert!(f.is_excluded("a.pyc"));
        assert!(!f.is_excluded("dir/a.pyc"));
    }

    #[test]
    fn test_double_star_crosses_segments() {
        let f = filter(&["config/**"]);
        assert!(f.is_excluded("config/a.file"));
        assert!(f.is_excluded("config/subdir/a.file"));
        assert!(!f.is_excluded("other/config.file"));
    }

    #[test]
    fn test_dir_pattern_matches_dir_with_trailing_slash() {
        let f = filter(&["config/**"]);
        // the walk appends "/" when checking the directory itself
        assert!(f.is_excluded("config/"));
        assert!(!f.is_excluded("config"));
    }

    #[test]
    fn test_nested_pycache_pattern() {
        let f = filter(&["**/__pycache__/**"]);
        assert!(f.is_excluded("__pycache__/"));
        assert!(f.is_excluded("foo/__pycache__/"));
        assert!(f.is_excluded("bar/__pycache__/foo.pyc"));
        assert!(!f.is_excluded("bar/cache/foo.pyc"));
    }

    #[test]
    fn test_question_mark_and_class() {
        let f = filter(&["file.?", "log[0-9].txt"]);
        assert!(f.is_excluded("file.a"));
        assert!(!f.is_excluded("file.ab"));
        assert!(!f.is_excluded("file./"));
        assert!(f.is_excluded("log3.txt"));
        assert!(!f.is_excluded("logx.txt"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = ExcludeFilter::new(&["[unclosed"]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidExcludePattern { .. }
        ));
    }
}
