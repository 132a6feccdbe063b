//! Content-identity cache
//!
//! Process-lived map from relative key to the last-observed remote content
//! identity (the S3 ETag, compared as an opaque string). An entry is written
//! only after the corresponding file has been atomically placed at its local
//! path; a crash mid-download therefore never leaves the cache claiming a
//! file we don't have, and the next cycle re-downloads it.

use crate::error::{PullError, PullResult};
use crate::filter::ExcludeFilter;
use crate::sync::inventory::{keep_entry, relative_key};
use md5::{Digest, Md5};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Mapping from relative key to remote content identity
///
/// All access goes through a single mutex; critical sections are one map
/// read or one map write. No eviction: the map is bounded by the number of
/// files under the prefix.
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: Mutex<HashMap<String, String>>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-observed identity for `key`, if any
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Record `identity` as current for `key`
    ///
    /// Callers must only do this after the file is in place locally.
    pub fn put(&self, key: impl Into<String>, identity: impl Into<String>) {
        self.entries.lock().insert(key.into(), identity.into());
    }

    /// Number of cached identities
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Warm the cache from files already on disk
    ///
    /// Walks `root` (honoring excludes) and seeds each file's quoted MD5 hex
    /// under its relative key, so a restart skips re-downloading files whose
    /// content already matches the remote. Objects uploaded multipart carry
    /// ETags that are not body MD5s; those re-download once and are cached
    /// from then on. Per-file read failures are logged and skipped; a walk
    /// failure is fatal.
    pub fn populate_from_local(&self, root: &Path, filter: &ExcludeFilter) -> PullResult<usize> {
        let mut seeded = 0usize;

        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| keep_entry(entry, root, filter));

        for entry in walker {
            let entry = entry.map_err(|e| PullError::Inventory {
                path: root.to_path_buf(),
                source: io::Error::from(e),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(key) = relative_key(root, entry.path()) else {
                continue;
            };

            match file_identity(entry.path()) {
                Ok(identity) => {
                    debug!(key, identity, "seeded identity from local file");
                    self.put(key, identity);
                    seeded += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e,
                        "failed to checksum local file, it will be re-downloaded");
                }
            }
        }

        Ok(seeded)
    }
}

/// Quoted MD5 hex of a file's content, matching the ETag convention for
/// non-multipart uploads
pub fn file_identity(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("\"{}\"", hex::encode(hasher.finalize())))
}
