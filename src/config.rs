//! Configuration types for objinsync
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Remote object URI parsing

use crate::error::{ConfigError, ConfigResult};
use crate::filter::ExcludeFilter;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of concurrent download workers
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Continuously synchronize a remote object store prefix into a local directory
#[derive(Parser, Debug, Clone)]
#[command(
    name = "objinsync",
    version,
    about = "Continuously synchronize a remote object store directory with a local directory",
    after_help = "EXAMPLES:\n    \
        objinsync pull s3://airflow-bucket/dags ./dags\n    \
        objinsync pull --once s3://bucket/prefix /data/mirror\n    \
        objinsync pull -e 'airflow.cfg' -e 'config/**' s3://bucket/home /srv/home\n    \
        objinsync pull --s3-endpoint http://minio:9000 --disable-ssl s3://bucket/x ./x"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Pull from remote to local
    Pull(PullArgs),
}

/// Arguments for the `pull` subcommand
#[derive(clap::Args, Debug, Clone)]
pub struct PullArgs {
    /// Remote prefix to mirror (scheme://bucket/prefix)
    #[arg(value_name = "REMOTE_URI")]
    pub remote_uri: String,

    /// Local directory to mirror into
    #[arg(value_name = "LOCAL_PATH")]
    pub local_path: PathBuf,

    /// Run a single pull cycle and then exit
    #[arg(short = 'o', long)]
    pub once: bool,

    /// Seconds between pull cycles in daemon mode
    #[arg(short = 'i', long, default_value = "5", value_name = "SECS")]
    pub interval: u64,

    /// Binding address for the health and metrics endpoint
    #[arg(short = 's', long, default_value = ":8087", value_name = "ADDR")]
    pub status_addr: String,

    /// Exclude files matching the given doublestar pattern (repeatable)
    #[arg(short = 'e', long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude: Vec<String>,

    /// Skip checksum warm-up and overwrite all files during the initial sync
    #[arg(long)]
    pub scratch: bool,

    /// Default mode for created local files, in octal
    #[arg(short = 'm', long, default_value = "0664", value_name = "OCTAL")]
    pub default_file_mode: String,

    /// Override endpoint for the remote object store (e.g. minio)
    #[arg(long = "s3-endpoint", value_name = "URL")]
    pub s3_endpoint: Option<String>,

    /// Disable SSL for the object store connection
    #[arg(long = "disable-ssl")]
    pub disable_ssl: bool,
}

/// Parsed remote object URI
///
/// Parsing is strict: exactly two `//`-separated halves, and the path half
/// must contain at least one `/`. The scheme is preserved verbatim (including
/// its trailing `:`) but never validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUri {
    /// Everything before the `//`, e.g. `s3:`
    pub scheme: String,

    /// Bucket name
    pub bucket: String,

    /// Key prefix relative to which object keys are interpreted
    pub prefix: String,
}

impl RemoteUri {
    /// Parse `scheme://bucket/prefix` into its parts
    pub fn parse(uri: &str) -> ConfigResult<Self> {
        let invalid = || ConfigError::InvalidRemoteUri {
            uri: uri.to_string(),
        };

        let (scheme, path) = uri.split_once("//").ok_or_else(invalid)?;
        let (bucket, prefix) = path.split_once('/').ok_or_else(invalid)?;

        Ok(Self {
            scheme: scheme.to_string(),
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Build the full object URI for a key in this bucket
    pub fn object_uri(&self, key: &str) -> String {
        format!("{}//{}/{}", self.scheme, self.bucket, key)
    }
}

impl std::fmt::Display for RemoteUri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}//{}/{}", self.scheme, self.bucket, self.prefix)
    }
}

/// Validated runtime configuration for the pull daemon
#[derive(Debug)]
pub struct PullConfig {
    /// Raw remote URI as given on the command line
    pub remote_uri: String,

    /// Local directory being mirrored into
    pub local_dir: PathBuf,

    /// Compiled exclude patterns
    pub filter: ExcludeFilter,

    /// Number of concurrent download workers
    pub worker_count: usize,

    /// Interval between cycles in daemon mode
    pub interval: Duration,

    /// Run a single cycle and exit
    pub once: bool,

    /// Skip the identity warm-up
    pub scratch: bool,

    /// Health/metrics binding address
    pub status_addr: SocketAddr,

    /// Mode applied to downloaded files
    pub default_file_mode: u32,

    /// Custom object store endpoint
    pub s3_endpoint: Option<String>,

    /// Disable SSL for the object store connection
    pub disable_ssl: bool,
}

impl PullConfig {
    /// Validate CLI arguments into a runtime configuration
    pub fn from_args(args: PullArgs) -> ConfigResult<Self> {
        // fail fast on a bad URI even though the puller re-parses per cycle
        RemoteUri::parse(&args.remote_uri)?;

        if !args.local_path.is_dir() {
            return Err(ConfigError::InvalidLocalDir {
                path: args.local_path,
            });
        }

        let filter = ExcludeFilter::new(&args.exclude)?;
        let default_file_mode = parse_file_mode(&args.default_file_mode)?;
        let status_addr = parse_status_addr(&args.status_addr)?;

        Ok(Self {
            remote_uri: args.remote_uri,
            local_dir: args.local_path,
            filter,
            worker_count: DEFAULT_WORKER_COUNT,
            interval: Duration::from_secs(args.interval),
            once: args.once,
            scratch: args.scratch,
            status_addr,
            default_file_mode,
            s3_endpoint: args.s3_endpoint,
            disable_ssl: args.disable_ssl,
        })
    }
}

/// Parse an octal mode string like `0664`
pub fn parse_file_mode(mode: &str) -> ConfigResult<u32> {
    u32::from_str_radix(mode, 8)
        .ok()
        .filter(|m| *m <= 0o7777)
        .ok_or_else(|| ConfigError::InvalidFileMode {
            mode: mode.to_string(),
        })
}

/// Parse a status address, accepting the bare-port `:8087` shorthand
pub fn parse_status_addr(addr: &str) -> ConfigResult<SocketAddr> {
    let normalized = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };

    normalized
        .parse()
        .map_err(|e: std::net::AddrParseError| ConfigError::InvalidStatusAddr {
            addr: addr.to_string(),
            reason: e.to_string(),
        })
}
