//! Command-line interface for db-loadgen
//!
//! # Usage Examples
//!
//! ```bash
//! # Environment-driven, like a container deployment
//! DB_HOST=postgres DB_PORT=5432 POSTGRES_PASSWORD=secret db-loadgen
//!
//! # Fail the process when any worker failed
//! db-loadgen --workers 20 --ramp-delay-ms 1000 --fail-on-worker-error
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`; `debug` shows
//! worker state transitions).

use anyhow::Context;
use clap::Parser;
use db_loadgen::{run_load, write_summary, LoadgenOpts};
use loadgen_engine::{stop_channel, StopHandle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let opts = LoadgenOpts::parse();
    let config = opts
        .load_config()
        .context("Invalid load configuration")?;

    let target = &config.target;
    info!(
        "Connection details: host={}, dbname={}, user={}, port={}, table={}",
        target.host, target.database, target.user, target.port, target.table
    );

    let (stop_handle, stop) = stop_channel();
    spawn_interrupt_handler(stop_handle);

    let summary = run_load(opts.backend, config, stop).await?;

    if let Some(path) = &opts.summary_output {
        write_summary(path, &summary)?;
        info!("Run summary written to {:?}", path);
    }

    if opts.fail_on_worker_error && summary.has_failures() {
        anyhow::bail!(
            "{} of {} workers failed",
            summary.failed,
            summary.total_workers
        );
    }

    Ok(())
}

/// Raise the stop signal on Ctrl+C: no further launches, running workers
/// finish their current operation and close their sessions.
fn spawn_interrupt_handler(stop_handle: StopHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received interrupt signal (Ctrl+C), stopping workers");
                stop_handle.stop();
            }
            Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
        }
    });
}
