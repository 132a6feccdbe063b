//! Error types for objinsync
//!
//! This module defines the error hierarchy that covers:
//! - Configuration and CLI errors
//! - Object store errors (listing, download, region resolution)
//! - Pull-cycle errors (inventory walk, scratch directory, worker startup)
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - A fatal error aborts the current pull cycle; per-task failures travel
//!   through the error queue as plain messages and never reach these types
//! - Preserve error chains for debugging

use std::path::PathBuf;
use thiserror::Error;

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Remote URI does not follow the `scheme://bucket/prefix` shape
    #[error("'{uri}' is not a valid object store URI (expected scheme://bucket/prefix)")]
    InvalidRemoteUri { uri: String },

    /// Local sync target does not exist or is not a directory
    #[error("local directory '{path}' does not exist or is not a directory")]
    InvalidLocalDir { path: PathBuf },

    /// Default file mode is not a valid octal mode string
    #[error("invalid default file mode '{mode}': expected an octal mode like 0664")]
    InvalidFileMode { mode: String },

    /// Exclude pattern failed to compile
    #[error("invalid exclude pattern '{pattern}': {source}")]
    InvalidExcludePattern {
        pattern: String,
        source: globset::Error,
    },

    /// Status endpoint address cannot be parsed
    #[error("invalid status address '{addr}': {reason}")]
    InvalidStatusAddr { addr: String, reason: String },
}

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// No region could be resolved from the environment or instance metadata
    #[error("failed to detect object store region: set AWS_REGION or run with instance metadata available")]
    NoRegion,

    /// Failed to construct the store client or its runtime
    #[error("failed to initialize object store client: {reason}")]
    Init { reason: String },

    /// Listing a page of objects failed
    #[error("failed to list objects under '{bucket}/{prefix}': {message}")]
    List {
        bucket: String,
        prefix: String,
        message: String,
    },

    /// Fetching an object body failed
    #[error("failed to download '{bucket}/{key}': {message}")]
    Download {
        bucket: String,
        key: String,
        message: String,
    },

    /// Writing the object body to the local writer failed
    #[error("failed to write body of '{key}': {source}")]
    Write {
        key: String,
        source: std::io::Error,
    },
}

/// Fatal pull-cycle errors
///
/// Anything here aborts the cycle. Per-task failures (parent dir creation,
/// temp file creation, a single failed download) are reported through the
/// error queue instead and leave the cycle running.
#[derive(Error, Debug)]
pub enum PullError {
    /// Configuration problem detected at cycle start
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Walking the local directory failed
    #[error("failed to list and prune local dir '{path}': {source}")]
    Inventory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Scratch directory could not be created under the local root
    #[error("failed to create scratch dir '{path}': {source}")]
    Scratch {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Object store failure (region resolution or listing)
    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    /// A worker thread could not be spawned
    #[error("failed to spawn download worker {id}: {reason}")]
    WorkerSpawn { id: usize, reason: String },

    /// The error aggregator thread could not be spawned
    #[error("failed to spawn error aggregator: {reason}")]
    AggregatorSpawn { reason: String },
}

/// Result type alias for ConfigError
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for PullError
pub type PullResult<T> = std::result::Result<T, PullError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::InvalidRemoteUri {
            uri: "not-a-uri".into(),
        };
        let pull_err: PullError = config_err.into();
        assert!(matches!(pull_err, PullError::Config(_)));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Download {
            bucket: "foo".into(),
            key: "home/dags/a.py".into(),
            message: "connection reset".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("foo/home/dags/a.py"));
        assert!(msg.contains("connection reset"));
    }
}
