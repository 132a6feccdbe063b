//! objinsync - Incremental Object Store Mirror
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use objinsync::config::{CliArgs, Command, PullConfig};
use objinsync::error::PullError;
use objinsync::metrics::PullMetrics;
use objinsync::server;
use objinsync::store::{S3Store, S3StoreOptions};
use objinsync::sync::{CycleReport, Puller};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging();

    match args.command {
        Command::Pull(pull_args) => {
            let config = PullConfig::from_args(pull_args).context("invalid configuration")?;
            run_pull(config)
        }
    }
}

fn run_pull(config: PullConfig) -> Result<()> {
    let PullConfig {
        remote_uri,
        local_dir,
        filter,
        worker_count,
        interval,
        once,
        scratch,
        status_addr,
        default_file_mode,
        s3_endpoint,
        disable_ssl,
    } = config;

    let store = S3Store::connect(S3StoreOptions {
        region: None,
        endpoint: s3_endpoint,
        disable_ssl,
    })
    .context("failed to connect to object store")?;

    let metrics = PullMetrics::register_default().context("failed to register metrics")?;

    let puller = Puller::new(Arc::new(store), remote_uri.clone(), local_dir.clone())?
        .with_filter(filter)
        .with_worker_count(worker_count)
        .with_file_mode(default_file_mode)
        .with_metrics(metrics.clone());

    if scratch {
        info!("skipping checksum warm-up, initial sync will overwrite all files");
    } else {
        let seeded = puller
            .populate_from_local()
            .context("failed to warm the identity cache from local files")?;
        info!(seeded, "identity cache warmed from local files");
    }

    if once {
        info!(remote = %remote_uri, local = %local_dir.display(), "pulling once");
        let report = run_cycle(&puller, &metrics).context("failed to pull objects from remote store")?;
        if let Some(summary) = report.error_summary() {
            bail!("failed to pull objects from remote store: {summary}");
        }
        return Ok(());
    }

    let ready = Arc::new(AtomicBool::new(false));
    spawn_status_server(status_addr, Arc::clone(&ready))?;

    info!(
        remote = %remote_uri,
        local = %local_dir.display(),
        interval_secs = interval.as_secs(),
        "pulling periodically"
    );
    loop {
        let report = run_cycle(&puller, &metrics).context("fatal pull failure")?;
        if let Some(summary) = report.error_summary() {
            // transient per-file failures self-heal on the next cycle
            error!(errors = %summary, "pull finished with errors");
        }
        ready.store(true, Ordering::SeqCst);
        thread::sleep(interval);
    }
}

/// Run one pull cycle and record its wall-clock time
fn run_cycle(puller: &Puller, metrics: &PullMetrics) -> std::result::Result<CycleReport, PullError> {
    info!("pull started");
    let start = Instant::now();
    let report = puller.pull()?;
    let elapsed = start.elapsed();
    metrics.sync_time.set(elapsed.as_millis() as f64);
    info!(
        files_listed = report.files_listed,
        files_pulled = report.files_pulled,
        files_deleted = report.files_deleted,
        elapsed_ms = elapsed.as_millis() as u64,
        "pull finished"
    );
    Ok(report)
}

/// Serve /health and /metrics from a dedicated thread
fn spawn_status_server(addr: SocketAddr, ready: Arc<AtomicBool>) -> Result<()> {
    thread::Builder::new()
        .name("status-server".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            let result = match runtime {
                Ok(rt) => rt.block_on(server::serve(addr, ready)),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                // a daemon without its health endpoint is unobservable
                error!(error = %e, "status server failed");
                std::process::exit(1);
            }
        })
        .context("failed to spawn status server thread")?;
    Ok(())
}

fn setup_logging() {
    let filter = if std::env::var_os("DEBUG").is_some() {
        EnvFilter::new("objinsync=debug,info")
    } else {
        EnvFilter::new("objinsync=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
