//! Worker outcomes, run summary, and result reporting.

use crate::error::ReleaseError;
use crate::operation::OperationResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};

/// Terminal status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Completed,
    ConnectionFailed,
    OperationFailed,
}

impl WorkerStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, WorkerStatus::Completed)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Completed => write!(f, "completed"),
            WorkerStatus::ConnectionFailed => write!(f, "connection failed"),
            WorkerStatus::OperationFailed => write!(f, "operation failed"),
        }
    }
}

/// Final result of one worker. Produced exactly once per launched worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub worker_id: usize,
    /// Iterations whose operation succeeded.
    pub iterations_completed: u64,
    pub status: WorkerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Launch time relative to the start of the run.
    pub launch_offset: Duration,
    /// Completed early because the stop signal was raised.
    #[serde(default)]
    pub stopped_early: bool,
}

impl WorkerOutcome {
    /// Outcome for a worker whose task ended without producing one.
    pub fn lost(worker_id: usize, launch_offset: Duration, reason: impl Into<String>) -> Self {
        Self {
            worker_id,
            iterations_completed: 0,
            status: WorkerStatus::OperationFailed,
            last_error: Some(reason.into()),
            launch_offset,
            stopped_early: false,
        }
    }
}

/// Aggregation of all worker outcomes of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_workers: usize,
    pub completed: usize,
    pub failed: usize,
    /// Successful operations across all workers.
    pub total_operations: u64,
    pub outcomes: Vec<WorkerOutcome>,
}

impl RunSummary {
    /// Fold one outcome into the summary.
    pub fn record(&mut self, outcome: WorkerOutcome) {
        self.total_workers += 1;
        if outcome.status.is_failure() {
            self.failed += 1;
        } else {
            self.completed += 1;
        }
        self.total_operations += outcome.iterations_completed;
        self.outcomes.push(outcome);
    }

    /// Build a finalized summary from a finished set of outcomes.
    pub fn summarize(outcomes: impl IntoIterator<Item = WorkerOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.record(outcome);
        }
        summary.finalize()
    }

    /// Order outcomes by worker id.
    pub fn finalize(mut self) -> Self {
        self.outcomes.sort_by_key(|o| o.worker_id);
        self
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    pub fn outcome(&self, worker_id: usize) -> Option<&WorkerOutcome> {
        self.outcomes.iter().find(|o| o.worker_id == worker_id)
    }
}

/// Observer for per-operation results, worker outcomes, and run completion.
pub trait Reporter: Send + Sync {
    /// One executed operation.
    fn operation(&self, worker_id: usize, result: &OperationResult);

    /// A worker released its session.
    fn session_closed(&self, worker_id: usize, result: Result<(), &ReleaseError>);

    /// A worker reached a terminal state.
    fn report(&self, outcome: &WorkerOutcome);

    /// All workers have terminated. Called exactly once per run.
    fn complete(&self, summary: &RunSummary);
}

/// Reporter that writes every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn operation(&self, worker_id: usize, result: &OperationResult) {
        match (&result.payload, &result.error) {
            (Some(payload), _) => info!(
                "Worker {}: {} request {}, {}",
                worker_id, result.kind, result.iteration, payload
            ),
            (None, Some(e)) => error!(
                "Worker {}: {} request {} failed: {}",
                worker_id, result.kind, result.iteration, e
            ),
            (None, None) => info!(
                "Worker {}: {} request {} finished",
                worker_id, result.kind, result.iteration
            ),
        }
    }

    fn session_closed(&self, worker_id: usize, result: Result<(), &ReleaseError>) {
        match result {
            Ok(()) => info!("Worker {}: Connection closed", worker_id),
            Err(e) => warn!("Worker {}: Failed to close connection: {}", worker_id, e),
        }
    }

    fn report(&self, outcome: &WorkerOutcome) {
        match (&outcome.status, &outcome.last_error) {
            (WorkerStatus::Completed, _) => info!(
                "Worker {} {} after {} iterations{}",
                outcome.worker_id,
                outcome.status,
                outcome.iterations_completed,
                if outcome.stopped_early {
                    " (stopped early)"
                } else {
                    ""
                }
            ),
            (status, Some(e)) => error!(
                "Worker {} {} after {} iterations: {}",
                outcome.worker_id, status, outcome.iterations_completed, e
            ),
            (status, None) => error!(
                "Worker {} {} after {} iterations",
                outcome.worker_id, status, outcome.iterations_completed
            ),
        }
    }

    fn complete(&self, summary: &RunSummary) {
        info!(
            "Workers: {} total, {} completed, {} failed; {} operations executed",
            summary.total_workers, summary.completed, summary.failed, summary.total_operations
        );
        info!("Load testing completed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(worker_id: usize, iterations: u64, status: WorkerStatus) -> WorkerOutcome {
        WorkerOutcome {
            worker_id,
            iterations_completed: iterations,
            status,
            last_error: None,
            launch_offset: Duration::ZERO,
            stopped_early: false,
        }
    }

    #[test]
    fn test_summarize_counts() {
        let summary = RunSummary::summarize(vec![
            outcome(2, 5, WorkerStatus::Completed),
            outcome(0, 0, WorkerStatus::ConnectionFailed),
            outcome(1, 2, WorkerStatus::OperationFailed),
        ]);

        assert_eq!(summary.total_workers, 3);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.total_operations, 7);
        assert!(summary.has_failures());
        let ids: Vec<usize> = summary.outcomes.iter().map(|o| o.worker_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_summary() {
        let summary = RunSummary::summarize(Vec::new());
        assert_eq!(summary.total_workers, 0);
        assert!(!summary.has_failures());
    }

    #[test]
    fn test_lost_outcome_is_failure() {
        let lost = WorkerOutcome::lost(4, Duration::from_secs(1), "worker task panicked");
        assert_eq!(lost.status, WorkerStatus::OperationFailed);
        assert_eq!(lost.iterations_completed, 0);
        assert_eq!(lost.last_error.as_deref(), Some("worker task panicked"));
    }

    #[test]
    fn test_summary_json() {
        let mut failed = outcome(1, 0, WorkerStatus::ConnectionFailed);
        failed.last_error = Some("Target db:5432 is unreachable".to_string());
        let summary = RunSummary::summarize(vec![outcome(0, 3, WorkerStatus::Completed), failed]);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["failed"], 1);
        assert_eq!(json["outcomes"][1]["status"], "connection_failed");
        assert!(json["outcomes"][0].get("last_error").is_none());

        let parsed: RunSummary = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, summary);
    }
}
