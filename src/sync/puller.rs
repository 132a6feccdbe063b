//! Reconciliation driver
//!
//! The puller orchestrates one cycle:
//!
//! ```text
//! local walk ──► delete-candidate set
//!                      │
//! remote listing ──► page classifier ──► task queue ──► worker pool
//!      (pages)          │  (skip unchanged,   (bounded)     │ atomic
//!                       │   un-delete seen)                 │ rename
//!                       ▼                                   ▼
//!                 delete leftovers ◄──── join ◄──── identity cache update
//! ```
//!
//! Within a cycle there is one producer (the listing callback feeding the
//! classifier), `W` download workers, and one error collector. Cycles
//! themselves never overlap; the daemon loop runs them sequentially.

use crate::config::{RemoteUri, DEFAULT_WORKER_COUNT};
use crate::error::{ConfigResult, PullError, PullResult};
use crate::filter::ExcludeFilter;
use crate::metrics::PullMetrics;
use crate::store::{ObjectRecord, ObjectStore};
use crate::sync::inventory::list_and_prune;
use crate::sync::worker::{DownloadTask, WorkerContext, WorkerPool};
use crate::sync::{IdentityCache, SCRATCH_DIR_NAME};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Capacity of the task and error queues; a full task queue blocks the
/// classifier and therefore the listing itself
const QUEUE_CAPACITY: usize = 30;

/// Outcome of one pull cycle
///
/// `errors` holds the non-fatal per-task messages collected during the
/// cycle; an empty list means a fully clean cycle.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub files_listed: u64,
    pub files_pulled: u64,
    pub files_deleted: u64,
    pub errors: Vec<String>,
}

impl CycleReport {
    /// True when no per-task errors were collected
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// All per-task errors joined into one report line
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Per-cycle scratch state, torn down before the next cycle begins
struct CycleState {
    files_to_delete: HashSet<PathBuf>,
    files_listed: u64,
    files_pulled: u64,
    task_tx: Sender<DownloadTask>,
}

/// Scratch directory under the local root, removed on every exit path
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(root: &Path) -> PullResult<Self> {
        let path = root.join(SCRATCH_DIR_NAME);
        fs::create_dir_all(&path).map_err(|source| PullError::Scratch {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        // also sweeps temps orphaned by aborted tasks
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Incremental mirror of a remote prefix into a local directory
pub struct Puller {
    store: Arc<dyn ObjectStore>,
    cache: Arc<IdentityCache>,
    remote_uri: String,
    local_dir: PathBuf,
    filter: ExcludeFilter,
    worker_count: usize,
    file_mode: u32,
    metrics: Option<PullMetrics>,
}

impl Puller {
    /// Create a puller mirroring `remote_uri` into `local_dir`
    pub fn new(
        store: Arc<dyn ObjectStore>,
        remote_uri: impl Into<String>,
        local_dir: impl Into<PathBuf>,
    ) -> ConfigResult<Self> {
        let remote_uri = remote_uri.into();
        RemoteUri::parse(&remote_uri)?;

        Ok(Self {
            store,
            cache: Arc::new(IdentityCache::new()),
            remote_uri,
            local_dir: local_dir.into(),
            filter: ExcludeFilter::default(),
            worker_count: DEFAULT_WORKER_COUNT,
            file_mode: 0o664,
            metrics: None,
        })
    }

    /// Replace the exclude filter
    pub fn with_filter(mut self, filter: ExcludeFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Override the number of download workers
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Override the mode applied to downloaded files
    pub fn with_file_mode(mut self, mode: u32) -> Self {
        self.file_mode = mode;
        self
    }

    /// Attach gauge handles updated at the end of every cycle
    pub fn with_metrics(mut self, metrics: PullMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The process-lived identity cache
    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Warm the identity cache from files already on disk
    pub fn populate_from_local(&self) -> PullResult<usize> {
        self.cache.populate_from_local(&self.local_dir, &self.filter)
    }

    /// Run one pull cycle
    ///
    /// Returns `Err` on fatal failures (inventory walk, URI parse, scratch
    /// directory, listing). Per-task failures are collected into the
    /// returned report instead; downloads that already completed are kept
    /// either way.
    pub fn pull(&self) -> PullResult<CycleReport> {
        let files_to_delete =
            list_and_prune(&self.local_dir, &self.filter).map_err(|source| {
                PullError::Inventory {
                    path: self.local_dir.clone(),
                    source,
                }
            })?;

        let remote = RemoteUri::parse(&self.remote_uri)?;

        let (task_tx, task_rx) = bounded(QUEUE_CAPACITY);
        let (err_tx, err_rx) = bounded(QUEUE_CAPACITY);

        let scratch = ScratchDir::create(&self.local_dir)?;

        let pool = WorkerPool::spawn(
            self.worker_count,
            WorkerContext {
                store: Arc::clone(&self.store),
                cache: Arc::clone(&self.cache),
                err_tx: err_tx.clone(),
                scratch_dir: scratch.path().to_path_buf(),
                file_mode: self.file_mode,
            },
            task_rx,
        )?;
        let aggregator = spawn_aggregator(err_rx)?;

        let mut state = CycleState {
            files_to_delete,
            files_listed: 0,
            files_pulled: 0,
            task_tx,
        };

        info!(bucket = %remote.bucket, prefix = %remote.prefix, "listing objects");
        let listing = self
            .store
            .list_pages(&remote.bucket, &remote.prefix, &mut |page| {
                self.handle_page(&page, &remote, &mut state)
            });

        let CycleState {
            files_to_delete,
            files_listed,
            files_pulled,
            task_tx,
        } = state;

        drop(task_tx); // close the queue: workers drain and exit
        pool.join();
        drop(err_tx); // close the queue: aggregator finishes
        let errors = aggregator.join().unwrap_or_default();

        if let Some(metrics) = &self.metrics {
            metrics.files_listed.set(files_listed as f64);
            metrics.files_pulled.set(files_pulled as f64);
        }

        // a failed listing aborts before deletion: without the full remote
        // view, everything still in the set would be purged wrongly
        listing?;

        let files_deleted = files_to_delete.len() as u64;
        if let Some(metrics) = &self.metrics {
            metrics.files_deleted.set(files_deleted as f64);
        }

        for path in &files_to_delete {
            debug!(path = %path.display(), "deleting stale local file");
            let _ = fs::remove_file(path);
        }

        Ok(CycleReport {
            files_listed,
            files_pulled,
            files_deleted,
            errors,
        })
    }

    /// Classify one listing page in listing order
    fn handle_page(&self, page: &[ObjectRecord], remote: &RemoteUri, state: &mut CycleState) {
        info!(count = page.len(), "object list page received");

        for obj in page {
            let key = obj.key.as_str();
            // object stores represent directories as zero-byte marker objects
            if key.ends_with('/') {
                debug!(key, "skipping directory marker");
                continue;
            }

            let uri = remote.object_uri(key);
            let Some(rel_path) = relativize(key, &remote.prefix) else {
                warn!(key, prefix = %remote.prefix, "listed key is not under the prefix, skipping");
                continue;
            };

            if self.filter.is_excluded(rel_path) {
                debug!(%uri, "skipped due to exclude pattern");
                continue;
            }

            // the remote still claims this file even if we skip the
            // download below, so it must never be purged
            let local_path = self.local_dir.join(rel_path);
            state.files_to_delete.remove(&local_path);

            if rel_path.is_empty() || rel_path == "/" || rel_path == "." {
                // the prefix marker itself, not a child
                continue;
            }

            state.files_listed += 1;

            if let Some(cached) = self.cache.get(rel_path) {
                debug!(key = rel_path, old = %cached, new = %obj.identity, "comparing identities");
                if cached == obj.identity {
                    continue;
                }
            }

            state.files_pulled += 1;
            let task = DownloadTask {
                uri,
                local_path,
                identity: obj.identity.clone(),
                key: rel_path.to_string(),
            };
            if state.task_tx.send(task).is_err() {
                warn!(key = rel_path, "task queue closed, dropping download");
            }
        }
    }
}

/// Compute the key's path relative to the prefix
///
/// Strict about segment boundaries: `home/dags` owns `home/dags/x` but not
/// `home/dagsfoo`. Returns the empty string for the prefix itself.
fn relativize<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(key);
    }
    let rest = key.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some("");
    }
    if prefix.ends_with('/') {
        return Some(rest);
    }
    rest.strip_prefix('/')
}

/// Collect per-task error messages until the queue closes
fn spawn_aggregator(err_rx: Receiver<String>) -> PullResult<JoinHandle<Vec<String>>> {
    thread::Builder::new()
        .name("error-collector".into())
        .spawn(move || {
            let mut messages = Vec::new();
            for msg in err_rx.iter() {
                messages.push(msg);
            }
            messages
        })
        .map_err(|e| PullError::AggregatorSpawn {
            reason: e.to_string(),
        })
}
