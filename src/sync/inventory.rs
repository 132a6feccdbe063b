//! Local inventory walk
//!
//! Before each pull cycle the local root is walked to produce the set of
//! files that are candidates for deletion; every object seen in the remote
//! listing knocks its path out of the set, and whatever remains at cycle end
//! is stale. The walk doubles as the empty-directory pruner: directories are
//! visited after their contents and removed with `remove_dir`, which only
//! succeeds once a directory is genuinely empty, so directories still
//! holding files (excluded ones included) survive the attempt.
//!
//! Excluded directories are never descended into and therefore never pruned;
//! excluded files are left out of the delete set so they are neither
//! downloaded over nor purged.

use crate::filter::ExcludeFilter;
use crate::sync::SCRATCH_DIR_NAME;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;
use walkdir::{DirEntry, WalkDir};

/// Forward-slash path of `path` relative to `root`
///
/// Returns `None` for the root itself or for paths outside the root.
pub(crate) fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let rel = rel.to_string_lossy();
    if rel.is_empty() {
        return None;
    }
    if cfg!(windows) {
        Some(rel.replace('\\', "/"))
    } else {
        Some(rel.into_owned())
    }
}

/// Walk predicate shared by the inventory and the cache warm-up
///
/// Skips the scratch directory at the top of the root and anything matched
/// by an exclude pattern. Directory checks append `/` so `foo/**` also
/// covers the directory `foo` itself.
pub(crate) fn keep_entry(entry: &DirEntry, root: &Path, filter: &ExcludeFilter) -> bool {
    if entry.depth() == 0 {
        return true;
    }

    let Some(rel) = relative_key(root, entry.path()) else {
        return true;
    };

    if entry.file_type().is_dir() {
        if entry.depth() == 1 && entry.file_name() == std::ffi::OsStr::new(SCRATCH_DIR_NAME) {
            return false;
        }
        !filter.is_excluded(&format!("{rel}/"))
    } else {
        !filter.is_excluded(&rel)
    }
}

/// Build the delete-candidate set and prune empty directories
///
/// Returns the absolute paths of every non-excluded regular file under
/// `root`. Directories that end up empty once their descendants have been
/// visited are removed, except the root itself. Any walk I/O failure is
/// fatal and surfaced to the caller.
pub fn list_and_prune(root: &Path, filter: &ExcludeFilter) -> std::io::Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();

    let walker = WalkDir::new(root)
        .contents_first(true)
        .into_iter()
        .filter_entry(|entry| keep_entry(entry, root, filter));

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.depth() == 0 {
            continue;
        }

        if entry.file_type().is_dir() {
            // contents-first ordering: children were already visited, and
            // empty child dirs are already gone, so this succeeds exactly
            // when nothing survived below
            if fs::remove_dir(entry.path()).is_ok() {
                trace!(path = %entry.path().display(), "pruned empty directory");
            }
        } else {
            files.insert(entry.path().to_path_buf());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"test").unwrap();
    }

    #[test]
    fn test_walk_and_delete_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let empty_dir = root.join("empty");
        fs::create_dir_all(&empty_dir).unwrap();

        let file_a = root.join("bar/a.go");
        touch(&file_a);
        let file_b = root.join("b.file");
        touch(&file_b);

        let filter = ExcludeFilter::new::<&str>(&[]).unwrap();
        let files = list_and_prune(root, &filter).unwrap();

        for f in [&file_a, &file_b] {
            assert!(f.exists(), "{} should not be deleted", f.display());
            assert!(files.contains(f.as_path()));
        }
        assert_eq!(files.len(), 2);

        assert!(!empty_dir.exists(), "empty dir should be pruned");
        assert!(root.exists(), "root is never pruned");
    }

    #[test]
    fn test_nested_empty_dirs_pruned_bottom_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("a/b/c")).unwrap();

        let filter = ExcludeFilter::new::<&str>(&[]).unwrap();
        let files = list_and_prune(root, &filter).unwrap();

        assert!(files.is_empty());
        assert!(!root.join("a").exists());
    }

    #[test]
    fn test_excluded_dirs_skipped_and_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::create_dir_all(root.join("foo/__pycache__")).unwrap();
        let pyc = root.join("bar/__pycache__/foo.pyc");
        touch(&pyc);

        let filter = ExcludeFilter::new(&["**/__pycache__/**"]).unwrap();
        let files = list_and_prune(root, &filter).unwrap();

        // nothing under an excluded dir lands in the delete set
        assert!(files.is_empty());

        // all three cache dirs survive: the walk never entered them, and
        // their parents fail the empty-dir removal because of them
        assert!(root.join("__pycache__").exists());
        assert!(root.join("foo/__pycache__").exists());
        assert!(pyc.exists());
    }

    #[test]
    fn test_anchored_exclude_only_matches_root_level() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("__pycache__")).unwrap();
        fs::create_dir_all(root.join("foo/__pycache__")).unwrap();

        let filter = ExcludeFilter::new(&["__pycache__/**"]).unwrap();
        list_and_prune(root, &filter).unwrap();

        // anchored pattern protects the root-level dir only
        assert!(root.join("__pycache__").exists());
        assert!(!root.join("foo/__pycache__").exists());
    }

    #[test]
    fn test_excluded_file_keeps_parent_alive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let cfg = root.join("conf/airflow.cfg");
        touch(&cfg);

        let filter = ExcludeFilter::new(&["conf/airflow.cfg"]).unwrap();
        let files = list_and_prune(root, &filter).unwrap();

        assert!(files.is_empty());
        assert!(cfg.exists(), "excluded file must not be deleted");
        assert!(root.join("conf").exists());
    }

    #[test]
    fn test_scratch_dir_is_invisible() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let leftover = root.join(SCRATCH_DIR_NAME).join("stale-tmp");
        touch(&leftover);

        let filter = ExcludeFilter::new::<&str>(&[]).unwrap();
        let files = list_and_prune(root, &filter).unwrap();

        assert!(files.is_empty());
        assert!(leftover.exists());
    }
}
