//! objinsync - Incremental Object Store Mirror
//!
//! A long-running daemon that keeps a local directory in sync with a prefix
//! in a remote object store. Each pull cycle downloads new and changed
//! objects, skips unchanged ones by content identity, and purges local files
//! the remote no longer has. A one-shot mode performs a single cycle and
//! exits.
//!
//! # Features
//!
//! - **Incremental**: per-object ETag comparison against a process-lived
//!   identity cache means steady-state cycles move zero bytes.
//!
//! - **Atomic Replacement**: downloads are staged in a scratch directory on
//!   the same filesystem and renamed into place, so readers never observe a
//!   partially written file.
//!
//! - **Bounded Concurrency**: a fixed pool of download workers fed through a
//!   bounded queue; a full queue pushes back on the remote listing itself.
//!
//! - **Exclude Patterns**: doublestar globs skip files from both the
//!   download path and the local deletion sweep.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Object Store (S3)                          │
//! └──────────────┬──────────────────────────────┬───────────────────┘
//!                │ ListObjectsV2 (pages)        │ GetObject
//!                ▼                              │
//! ┌─────────────────────────────┐               │
//! │       Page Classifier       │               │
//! │  skip markers / excludes    │               │
//! │  skip unchanged identities  │               │
//! │  un-delete everything seen  │               │
//! └──────────────┬──────────────┘               │
//!                │ DownloadTask                 │
//!                ▼                              ▼
//! ┌─────────────────────────────┐   ┌─────────────────────────┐
//! │   Task Queue (bounded 30)   │──►│     Worker Pool (5)     │
//! └─────────────────────────────┘   │ temp file → chmod →     │
//!                                   │ rename → cache update   │
//! ┌─────────────────────────────┐   └────────────┬────────────┘
//! │  Error Queue (bounded 30)   │◄───────────────┘
//! └──────────────┬──────────────┘
//!                ▼
//!      "msg; msg; msg" cycle report, then delete leftover local files
//! ```
//!
//! # Example
//!
//! ```bash
//! # mirror an Airflow DAG bucket every 5 seconds
//! objinsync pull s3://airflow-bucket/dags /opt/airflow/dags
//!
//! # one-shot sync with excludes
//! objinsync pull --once -e 'airflow.cfg' -e 'config/**' s3://bucket/home ./home
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod server;
pub mod store;
pub mod sync;

pub use config::{CliArgs, Command, PullArgs, PullConfig, RemoteUri};
pub use error::{ConfigError, PullError, StoreError};
pub use filter::ExcludeFilter;
pub use metrics::PullMetrics;
pub use store::{ObjectRecord, ObjectStore, S3Store, S3StoreOptions};
pub use sync::{CycleReport, DownloadTask, IdentityCache, Puller};
