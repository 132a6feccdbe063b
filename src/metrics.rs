//! Prometheus gauges for the pull loop
//!
//! Each pull cycle overwrites the gauges with that cycle's counts. The
//! handles are injected into the puller and the daemon loop at construction
//! so tests can register against a private registry; the default constructor
//! uses the process-wide registry that `/metrics` exposes.

use prometheus::{Gauge, Opts, Registry};

/// Gauge handles shared between the puller and the daemon loop
#[derive(Clone)]
pub struct PullMetrics {
    /// Milliseconds a full sync loop took
    pub sync_time: Gauge,

    /// Files checked in the last pull cycle
    pub files_listed: Gauge,

    /// Files pulled in the last pull cycle
    pub files_pulled: Gauge,

    /// Files deleted in the last pull cycle
    pub files_deleted: Gauge,
}

impl PullMetrics {
    /// Create the gauges and register them against the given registry
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let sync_time = gauge(
            registry,
            "loop",
            "sync_time",
            "Number of milliseconds it takes to complete a full sync loop.",
        )?;
        let files_listed = gauge(
            registry,
            "pull",
            "files_listed",
            "Number of files checked in each pull cycle.",
        )?;
        let files_pulled = gauge(
            registry,
            "pull",
            "files_pulled",
            "Number of files pulled in each pull cycle.",
        )?;
        let files_deleted = gauge(
            registry,
            "pull",
            "files_deleted",
            "Number of files deleted in each pull cycle.",
        )?;

        Ok(Self {
            sync_time,
            files_listed,
            files_pulled,
            files_deleted,
        })
    }

    /// Register against the process-wide default registry
    pub fn register_default() -> prometheus::Result<Self> {
        Self::register(prometheus::default_registry())
    }
}

fn gauge(registry: &Registry, subsystem: &str, name: &str, help: &str) -> prometheus::Result<Gauge> {
    let gauge = Gauge::with_opts(
        Opts::new(name, help)
            .namespace("objinsync")
            .subsystem(subsystem),
    )?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}
