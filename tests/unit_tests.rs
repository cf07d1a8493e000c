use clap::Parser;
use db_loadgen::{run_load, write_summary, BackendKind, LoadgenOpts};
use loadgen_engine::{ConfigError, OperationKind, RunSummary, StopSignal, WorkerStatus};
use std::time::Duration;

fn parse(args: &[&str]) -> LoadgenOpts {
    let mut argv = vec!["db-loadgen"];
    argv.extend_from_slice(args);
    LoadgenOpts::try_parse_from(argv).unwrap()
}

#[test]
fn test_defaults_match_reference_workload() {
    let opts = parse(&[]);
    let config = opts.load_config().unwrap();

    assert_eq!(opts.backend, BackendKind::PostgreSQL);
    assert!(opts.summary_output.is_none());
    assert!(!opts.fail_on_worker_error);

    assert_eq!(config.worker_count, 150);
    assert_eq!(config.ramp_delay, Duration::from_secs(30));
    assert_eq!(config.iterations_per_worker, 2000);
    assert_eq!(config.pacing, Duration::from_millis(500));
    assert_eq!(config.weights.weight(OperationKind::Read), 1);
    assert_eq!(config.weights.weight(OperationKind::Write), 1);
    assert_eq!(config.seed, None);
    assert_eq!(config.target.table, "load_test_table");
}

#[test]
fn test_workload_flags() {
    let opts = parse(&[
        "--workers",
        "3",
        "--ramp-delay-ms",
        "250",
        "--iterations",
        "5",
        "--weights",
        "read=1,write=3",
        "--pacing-ms",
        "0",
        "--operation-timeout-ms",
        "1500",
        "--connect-timeout-ms",
        "2500",
        "--seed",
        "42",
        "--backend",
        "memory",
        "--fail-on-worker-error",
    ]);
    let config = opts.load_config().unwrap();

    assert_eq!(opts.backend, BackendKind::Memory);
    assert!(opts.fail_on_worker_error);
    assert_eq!(config.worker_count, 3);
    assert_eq!(config.ramp_delay, Duration::from_millis(250));
    assert_eq!(config.iterations_per_worker, 5);
    assert_eq!(config.weights.weight(OperationKind::Write), 3);
    assert_eq!(config.pacing, Duration::ZERO);
    assert_eq!(config.operation_timeout, Duration::from_millis(1500));
    assert_eq!(config.connect_timeout, Duration::from_millis(2500));
    assert_eq!(config.seed, Some(42));
}

#[test]
fn test_target_flags() {
    let opts = parse(&[
        "--db-host",
        "db.internal",
        "--db-port",
        "5432",
        "--db-name",
        "bench",
        "--db-user",
        "loader",
        "--db-password",
        "hunter2",
        "--table",
        "bench_rows",
    ]);
    let config = opts.load_config().unwrap();

    assert_eq!(config.target.endpoint(), "db.internal:5432/bench");
    assert_eq!(config.target.user, "loader");
    assert_eq!(config.target.credential, "hunter2");
    assert_eq!(config.target.table, "bench_rows");
}

#[test]
fn test_rejects_malformed_weights() {
    let argv = ["db-loadgen", "--weights", "read=1,delete=2"];
    assert!(LoadgenOpts::try_parse_from(argv).is_err());

    let argv = ["db-loadgen", "--weights", "read=0,write=0"];
    assert!(LoadgenOpts::try_parse_from(argv).is_err());
}

#[test]
fn test_zero_workers_is_config_error() {
    let opts = parse(&["--workers", "0"]);
    assert_eq!(opts.load_config().unwrap_err(), ConfigError::NoWorkers);
}

#[tokio::test]
async fn test_memory_backend_dry_run() {
    let opts = parse(&[
        "--backend",
        "memory",
        "--workers",
        "3",
        "--ramp-delay-ms",
        "0",
        "--iterations",
        "5",
        "--pacing-ms",
        "0",
        "--seed",
        "7",
    ]);
    let config = opts.load_config().unwrap();

    let summary = run_load(opts.backend, config, StopSignal::never())
        .await
        .unwrap();

    assert_eq!(summary.total_workers, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.total_operations, 15);
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn test_write_summary_json() {
    let opts = parse(&[
        "--backend",
        "memory",
        "--workers",
        "2",
        "--ramp-delay-ms",
        "0",
        "--iterations",
        "3",
        "--pacing-ms",
        "0",
    ]);
    let summary = run_load(opts.backend, opts.load_config().unwrap(), StopSignal::never())
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");
    write_summary(&path, &summary).unwrap();

    let written: RunSummary =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, summary);
    assert!(written
        .outcomes
        .iter()
        .all(|o| o.status == WorkerStatus::Completed));
}

#[test]
fn test_write_summary_to_missing_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("summary.json");

    let err = write_summary(&path, &RunSummary::default()).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to write run summary"));
}
