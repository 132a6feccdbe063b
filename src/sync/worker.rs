//! Download worker pool
//!
//! A fixed number of worker threads drain the bounded task channel until the
//! classifier closes it. Each task is one atomic single-file replacement:
//! stage the body into a temp file inside the scratch directory (same
//! filesystem as the destination, so the rename is atomic), apply the
//! default file mode, rename over the destination, then record the new
//! identity in the cache.
//!
//! Workers touch nothing else of the cycle state: per-task failures go to
//! the error queue as messages and the task is abandoned, leaving the
//! previous file version (if any) in place.

use crate::config::RemoteUri;
use crate::error::{PullError, PullResult};
use crate::store::ObjectStore;
use crate::sync::IdentityCache;
use crossbeam_channel::{Receiver, Sender};
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// One file to fetch
///
/// Produced by the page classifier, consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Full object URI, `scheme://bucket/key`
    pub uri: String,

    /// Absolute destination path under the local root
    pub local_path: PathBuf,

    /// Remote content identity to record on success
    pub identity: String,

    /// Relative key, shared between local path suffix and remote key suffix
    pub key: String,
}

/// Everything a worker needs besides the task itself
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub store: Arc<dyn ObjectStore>,
    pub cache: Arc<IdentityCache>,
    pub err_tx: Sender<String>,
    pub scratch_dir: PathBuf,
    pub file_mode: u32,
}

/// Fixed-size pool of download threads
pub(crate) struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers draining `tasks`
    pub fn spawn(
        count: usize,
        ctx: WorkerContext,
        tasks: Receiver<DownloadTask>,
    ) -> PullResult<Self> {
        let mut handles = Vec::with_capacity(count);

        for id in 0..count {
            let ctx = ctx.clone();
            let rx = tasks.clone();
            let handle = thread::Builder::new()
                .name(format!("downloader-{id}"))
                .spawn(move || {
                    debug!(id, "download worker started");
                    for task in rx.iter() {
                        handle_task(&ctx, task);
                    }
                    debug!(id, "download worker exited");
                })
                .map_err(|e| PullError::WorkerSpawn {
                    id,
                    reason: e.to_string(),
                })?;
            handles.push(handle);
        }

        Ok(Self { handles })
    }

    /// Wait for every worker to drain and exit
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                error!("download worker panicked");
            }
        }
    }
}

/// Perform one atomic download-and-replace
fn handle_task(ctx: &WorkerContext, task: DownloadTask) {
    if task.uri.ends_with('/') {
        // directory markers never get this far, but a malformed listing
        // must not turn into a local file named like a directory
        return;
    }

    let remote = match RemoteUri::parse(&task.uri) {
        Ok(remote) => remote,
        Err(e) => {
            report(ctx, format!("got invalid remote uri {}: {e}", task.uri));
            return;
        }
    };

    if let Some(parent) = task.local_path.parent() {
        if !parent.exists() {
            if let Err(e) = fs::create_dir_all(parent) {
                report(
                    ctx,
                    format!(
                        "failed to create directory {} for {}: {e}",
                        parent.display(),
                        task.local_path.display()
                    ),
                );
                return;
            }
        }
    }

    // deterministic name from the destination digest: workers staging
    // different destinations never collide on a temp file
    let tmp_path = ctx.scratch_dir.join(temp_file_name(&task.local_path));
    let mut tmp = match File::create(&tmp_path) {
        Ok(file) => file,
        Err(e) => {
            report(
                ctx,
                format!("failed to create temp file {} for download: {e}", tmp_path.display()),
            );
            return;
        }
    };

    if let Err(e) = apply_mode(&tmp, ctx.file_mode) {
        report(
            ctx,
            format!("failed to set mode on temp file {}: {e}", tmp_path.display()),
        );
        discard(tmp, &tmp_path);
        return;
    }

    if let Err(e) = ctx.store.download(&mut tmp, &remote.bucket, &remote.prefix) {
        report(ctx, format!("failed to download {}: {e}", task.uri));
        discard(tmp, &tmp_path);
        return;
    }
    drop(tmp);

    if let Err(e) = fs::rename(&tmp_path, &task.local_path) {
        report(
            ctx,
            format!(
                "failed to replace file {} for download: {e}",
                task.local_path.display()
            ),
        );
        let _ = fs::remove_file(&tmp_path);
        return;
    }

    debug!(key = %task.key, identity = %task.identity, "updating identity cache");
    ctx.cache.put(task.key, task.identity);
}

fn report(ctx: &WorkerContext, message: String) {
    if ctx.err_tx.send(message).is_err() {
        error!("error queue closed while a worker was still reporting");
    }
}

fn discard(tmp: File, tmp_path: &Path) {
    drop(tmp);
    let _ = fs::remove_file(tmp_path);
}

/// Hex digest of the destination path, used as the temp file name
fn temp_file_name(dest: &Path) -> String {
    let mut hasher = Md5::new();
    hasher.update(dest.as_os_str().as_encoded_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(unix)]
fn apply_mode(file: &File, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn apply_mode(_file: &File, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::ObjectRecord;
    use crossbeam_channel::unbounded;
    use std::io::Write;

    struct ByteStore {
        body: Vec<u8>,
        fail: bool,
    }

    impl ObjectStore for ByteStore {
        fn list_pages(
            &self,
            _bucket: &str,
            _prefix: &str,
            _on_page: &mut dyn FnMut(Vec<ObjectRecord>),
        ) -> StoreResult<()> {
            Ok(())
        }

        fn download(&self, writer: &mut dyn Write, bucket: &str, key: &str) -> StoreResult<u64> {
            if self.fail {
                return Err(StoreError::Download {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message: "simulated outage".into(),
                });
            }
            writer.write_all(&self.body).unwrap();
            Ok(self.body.len() as u64)
        }
    }

    fn context(store: ByteStore, scratch: &Path) -> (WorkerContext, Receiver<String>) {
        let (err_tx, err_rx) = unbounded();
        let ctx = WorkerContext {
            store: Arc::new(store),
            cache: Arc::new(IdentityCache::new()),
            err_tx,
            scratch_dir: scratch.to_path_buf(),
            file_mode: 0o664,
        };
        (ctx, err_rx)
    }

    fn task(dir: &Path, rel: &str) -> DownloadTask {
        DownloadTask {
            uri: format!("s3://foo/home/dags/{rel}"),
            local_path: dir.join(rel),
            identity: "\"1\"".into(),
            key: rel.to_string(),
        }
    }

    #[test]
    fn test_temp_file_name_is_deterministic() {
        let a = temp_file_name(Path::new("/tmp/x/a.py"));
        let b = temp_file_name(Path::new("/tmp/x/a.py"));
        let c = temp_file_name(Path::new("/tmp/x/b.py"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_successful_download_places_file_and_updates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".objinsync");
        fs::create_dir_all(&scratch).unwrap();

        let (ctx, err_rx) = context(
            ByteStore {
                body: b"payload".to_vec(),
                fail: false,
            },
            &scratch,
        );

        handle_task(&ctx, task(dir.path(), "a.py"));

        assert_eq!(fs::read(dir.path().join("a.py")).unwrap(), b"payload");
        assert_eq!(ctx.cache.get("a.py").as_deref(), Some("\"1\""));
        drop(ctx);
        assert!(err_rx.try_recv().is_err(), "no errors expected");
    }

    #[test]
    fn test_failed_download_reports_and_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".objinsync");
        fs::create_dir_all(&scratch).unwrap();

        let (ctx, err_rx) = context(
            ByteStore {
                body: vec![],
                fail: true,
            },
            &scratch,
        );

        handle_task(&ctx, task(dir.path(), "a.py"));

        assert!(!dir.path().join("a.py").exists());
        assert!(ctx.cache.get("a.py").is_none(), "cache must stay cold on failure");
        assert!(
            fs::read_dir(&scratch).unwrap().next().is_none(),
            "temp file must be cleaned up"
        );
        let msg = err_rx.try_recv().unwrap();
        assert!(msg.contains("failed to download"));
    }

    #[test]
    fn test_nested_destination_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".objinsync");
        fs::create_dir_all(&scratch).unwrap();

        let (ctx, _err_rx) = context(
            ByteStore {
                body: b"x".to_vec(),
                fail: false,
            },
            &scratch,
        );

        handle_task(&ctx, task(dir.path(), "123/foo/bar"));

        assert!(dir.path().join("123").is_dir());
        assert!(dir.path().join("123/foo").is_dir());
        assert!(dir.path().join("123/foo/bar").is_file());
    }

    #[test]
    fn test_directory_marker_uri_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".objinsync");
        fs::create_dir_all(&scratch).unwrap();

        let (ctx, err_rx) = context(
            ByteStore {
                body: vec![],
                fail: false,
            },
            &scratch,
        );

        let mut marker = task(dir.path(), "sub");
        marker.uri.push('/');
        handle_task(&ctx, marker);

        assert!(!dir.path().join("sub").exists());
        drop(ctx);
        assert!(err_rx.try_recv().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_default_file_mode_applied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let scratch = dir.path().join(".objinsync");
        fs::create_dir_all(&scratch).unwrap();

        let (ctx, _err_rx) = context(
            ByteStore {
                body: b"x".to_vec(),
                fail: false,
            },
            &scratch,
        );

        handle_task(&ctx, task(dir.path(), "a.py"));

        let mode = fs::metadata(dir.path().join("a.py")).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o664);
    }
}
