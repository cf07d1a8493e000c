//! db-loadgen library
//!
//! Command-line options and run wiring for the `db-loadgen` binary. The
//! workload itself lives in `loadgen_engine`; the PostgreSQL client lives in
//! `loadgen_postgresql`.
//!
//! # CLI Usage
//!
//! ```bash
//! # Default workload: 150 workers launched 30s apart, 2000 iterations each
//! db-loadgen --db-host localhost --db-port 5432
//!
//! # Short write-heavy run with a JSON summary
//! db-loadgen --workers 10 --ramp-delay-ms 500 --iterations 100 \
//!   --weights read=1,write=3 --summary-output summary.json
//!
//! # Dry run without a database
//! db-loadgen --backend memory --workers 4 --ramp-delay-ms 0 --pacing-ms 0
//! ```

use anyhow::Context;
use clap::{Args, Parser, ValueEnum};
use loadgen_engine::{
    ConfigError, Driver, LoadConfig, MemoryBackend, OperationWeights, RunSummary, StopSignal,
};
use loadgen_postgresql::{PostgreSQLTargetArgs, PostgresBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "db-loadgen")]
#[command(about = "Ramped concurrent read/write load generator for PostgreSQL")]
#[command(long_about = None)]
pub struct LoadgenOpts {
    /// Target database connection options
    #[command(flatten)]
    pub target: PostgreSQLTargetArgs,

    /// Workload shape
    #[command(flatten)]
    pub workload: WorkloadOpts,

    /// Backend to send load to
    #[arg(long, env = "LOADGEN_BACKEND", value_enum, default_value_t = BackendKind::PostgreSQL)]
    pub backend: BackendKind,

    /// Write the run summary as JSON to this file
    #[arg(long, value_name = "PATH")]
    pub summary_output: Option<PathBuf>,

    /// Exit with a non-zero status when any worker failed
    #[arg(long)]
    pub fail_on_worker_error: bool,
}

#[derive(Args, Clone, Debug)]
pub struct WorkloadOpts {
    /// Number of workers to launch
    #[arg(long, env = "LOADGEN_WORKERS", default_value = "150")]
    pub workers: usize,

    /// Delay between successive worker launches, in milliseconds
    #[arg(long, env = "LOADGEN_RAMP_DELAY_MS", default_value = "30000")]
    pub ramp_delay_ms: u64,

    /// Iterations each worker runs
    #[arg(long, env = "LOADGEN_ITERATIONS", default_value = "2000")]
    pub iterations: u64,

    /// Operation mix (e.g., read=1,write=3)
    #[arg(long, env = "LOADGEN_WEIGHTS", default_value = "read=1,write=1")]
    pub weights: OperationWeights,

    /// Wait between iterations of one worker, in milliseconds
    #[arg(long, env = "LOADGEN_PACING_MS", default_value = "500")]
    pub pacing_ms: u64,

    /// Upper bound for a single operation, in milliseconds
    #[arg(long, env = "LOADGEN_OPERATION_TIMEOUT_MS", default_value = "30000")]
    pub operation_timeout_ms: u64,

    /// Upper bound for opening a session, in milliseconds
    #[arg(long, env = "LOADGEN_CONNECT_TIMEOUT_MS", default_value = "10000")]
    pub connect_timeout_ms: u64,

    /// Random seed for a reproducible operation mix (same seed = same sequence)
    #[arg(long, env = "LOADGEN_SEED")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// PostgreSQL via tokio-postgres
    #[value(name = "postgresql")]
    PostgreSQL,
    /// In-process table, for dry runs
    Memory,
}

impl LoadgenOpts {
    /// Build the validated run configuration.
    pub fn load_config(&self) -> Result<LoadConfig, ConfigError> {
        let workload = &self.workload;
        let config = LoadConfig::new(self.target.clone().into_target())
            .with_worker_count(workload.workers)
            .with_ramp_delay(Duration::from_millis(workload.ramp_delay_ms))
            .with_iterations(workload.iterations)
            .with_weights(workload.weights.clone())
            .with_pacing(Duration::from_millis(workload.pacing_ms))
            .with_operation_timeout(Duration::from_millis(workload.operation_timeout_ms))
            .with_connect_timeout(Duration::from_millis(workload.connect_timeout_ms))
            .with_seed(workload.seed);
        config.validate()?;
        Ok(config)
    }
}

/// Run the workload against the selected backend until every launched worker
/// has finished.
pub async fn run_load(
    backend: BackendKind,
    config: LoadConfig,
    stop: StopSignal,
) -> anyhow::Result<RunSummary> {
    let summary = match backend {
        BackendKind::PostgreSQL => {
            Driver::new(Arc::new(PostgresBackend::new()), config)?
                .with_stop_signal(stop)
                .run()
                .await
        }
        BackendKind::Memory => {
            Driver::new(Arc::new(MemoryBackend::new()), config)?
                .with_stop_signal(stop)
                .run()
                .await
        }
    };
    Ok(summary)
}

/// Write `summary` as pretty-printed JSON.
pub fn write_summary(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write run summary to {path:?}"))?;
    Ok(())
}
