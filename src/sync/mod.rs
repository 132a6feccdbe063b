//! Incremental reconciliation engine
//!
//! One pull cycle walks the local tree into a delete-candidate set, lists
//! the remote prefix page by page, classifies every object as new, changed,
//! unchanged, or stale, downloads through a bounded worker pool with atomic
//! replacement, and finally removes whatever the remote no longer claims.

pub mod cache;
pub mod inventory;
pub mod puller;
pub mod worker;

pub use cache::IdentityCache;
pub use puller::{CycleReport, Puller};
pub use worker::DownloadTask;

/// Hidden scratch directory under the local root
///
/// Temp files staged here share a filesystem with their destinations, which
/// is what makes the final rename atomic. Created at cycle start, removed at
/// cycle end, and always invisible to the inventory walk.
pub const SCRATCH_DIR_NAME: &str = ".objinsync";
