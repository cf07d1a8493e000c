//! In-process backend.
//!
//! Keeps the target table in memory and supports fault injection, so the
//! engine can be exercised without a database (`--backend memory` dry runs
//! and the engine tests).

use crate::backend::{Backend, Session};
use crate::config::TargetDescriptor;
use crate::error::{ConnectionError, OperationError, ReleaseError};
use crate::operation::{
    AggregateQuery, AggregateRow, OperationIntent, OperationPayload, SyntheticRow,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Faults the backend injects.
#[derive(Debug, Clone, Default)]
struct FaultPlan {
    unreachable: bool,
    failing_operations: HashSet<(usize, u64)>,
    failing_close: bool,
    operation_delay: Option<Duration>,
    connect_delay: Option<Duration>,
    bootstrap_delay: Option<Duration>,
    close_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<SyntheticRow>,
    /// Close calls per session, indexed by session number.
    close_counts: Vec<u32>,
    operations: u64,
    bootstrapped: bool,
}

/// Backend that stores rows in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultPlan>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect and bootstrap fails.
    pub fn unreachable(mut self) -> Self {
        Arc::make_mut(&mut self.faults).unreachable = true;
        self
    }

    /// Fail the operation `worker_id` issues at `iteration` (0-based).
    pub fn fail_operation(mut self, worker_id: usize, iteration: u64) -> Self {
        Arc::make_mut(&mut self.faults)
            .failing_operations
            .insert((worker_id, iteration));
        self
    }

    /// Every session close reports an error.
    pub fn fail_close(mut self) -> Self {
        Arc::make_mut(&mut self.faults).failing_close = true;
        self
    }

    /// Delay every operation by `delay`.
    pub fn with_operation_delay(mut self, delay: Duration) -> Self {
        Arc::make_mut(&mut self.faults).operation_delay = Some(delay);
        self
    }

    /// Delay every connect by `delay`.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        Arc::make_mut(&mut self.faults).connect_delay = Some(delay);
        self
    }

    /// Delay bootstrap by `delay`.
    pub fn with_bootstrap_delay(mut self, delay: Duration) -> Self {
        Arc::make_mut(&mut self.faults).bootstrap_delay = Some(delay);
        self
    }

    /// Delay every session close by `delay`. The close is counted before the
    /// delay starts.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        Arc::make_mut(&mut self.faults).close_delay = Some(delay);
        self
    }

    /// Rows written so far.
    pub async fn rows(&self) -> Vec<SyntheticRow> {
        self.state.lock().await.rows.clone()
    }

    /// Number of sessions ever opened.
    pub async fn sessions_opened(&self) -> usize {
        self.state.lock().await.close_counts.len()
    }

    /// Close calls per opened session.
    pub async fn close_counts(&self) -> Vec<u32> {
        self.state.lock().await.close_counts.clone()
    }

    /// Successful operations across all sessions.
    pub async fn operations_executed(&self) -> u64 {
        self.state.lock().await.operations
    }

    pub async fn is_bootstrapped(&self) -> bool {
        self.state.lock().await.bootstrapped
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    type Session = MemorySession;

    async fn connect(&self, target: &TargetDescriptor) -> Result<MemorySession, ConnectionError> {
        if self.faults.unreachable {
            return Err(ConnectionError::Unreachable(target.endpoint()));
        }
        if let Some(delay) = self.faults.connect_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        let id = state.close_counts.len();
        state.close_counts.push(0);

        Ok(MemorySession {
            id,
            state: self.state.clone(),
            faults: self.faults.clone(),
            closed: false,
        })
    }

    async fn bootstrap(&self, target: &TargetDescriptor) -> Result<(), OperationError> {
        if self.faults.unreachable {
            return Err(OperationError::Backend(format!(
                "target {} is unreachable",
                target.endpoint()
            )));
        }
        if let Some(delay) = self.faults.bootstrap_delay {
            tokio::time::sleep(delay).await;
        }
        self.state.lock().await.bootstrapped = true;
        Ok(())
    }
}

/// Session on a [`MemoryBackend`].
#[derive(Debug)]
pub struct MemorySession {
    id: usize,
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<FaultPlan>,
    closed: bool,
}

#[async_trait]
impl Session for MemorySession {
    async fn execute(
        &mut self,
        intent: &OperationIntent,
    ) -> Result<OperationPayload, OperationError> {
        if self.closed {
            return Err(OperationError::Backend("session is closed".to_string()));
        }
        if let Some(delay) = self.faults.operation_delay {
            tokio::time::sleep(delay).await;
        }

        let (worker_id, iteration) = (intent.worker_id(), intent.iteration());
        if self
            .faults
            .failing_operations
            .contains(&(worker_id, iteration))
        {
            return Err(OperationError::Injected {
                worker_id,
                iteration,
            });
        }

        let mut state = self.state.lock().await;
        let payload = match intent {
            OperationIntent::Read { query, .. } => {
                OperationPayload::Aggregate(aggregate(&state.rows, *query))
            }
            OperationIntent::Write(row) => {
                state.rows.push(row.clone());
                OperationPayload::Inserted(row.clone())
            }
        };
        state.operations += 1;

        Ok(payload)
    }

    async fn close(&mut self) -> Result<(), ReleaseError> {
        if let Some(count) = self.state.lock().await.close_counts.get_mut(self.id) {
            *count += 1;
        }
        if let Some(delay) = self.faults.close_delay {
            tokio::time::sleep(delay).await;
        }

        if self.closed {
            return Err(ReleaseError::AlreadyClosed);
        }
        self.closed = true;

        if self.faults.failing_close {
            return Err(ReleaseError::Backend(format!(
                "injected close failure for session {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Largest per-worker group; ties go to the lowest worker id.
fn aggregate(rows: &[SyntheticRow], query: AggregateQuery) -> Option<AggregateRow> {
    match query {
        AggregateQuery::TopWorker => {
            let mut groups: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
            for row in rows {
                groups.entry(row.worker_id).or_default().push(row.value);
            }

            let mut top: Option<(usize, Vec<f64>)> = None;
            for (worker_id, values) in groups {
                if top
                    .as_ref()
                    .map_or(true, |(_, best)| values.len() > best.len())
                {
                    top = Some((worker_id, values));
                }
            }

            top.map(|(worker_id, values)| {
                let count = values.len();
                let sum: f64 = values.iter().sum();
                AggregateRow {
                    worker_id,
                    count: count as i64,
                    avg: sum / count as f64,
                    max: values.iter().copied().fold(f64::MIN, f64::max),
                    min: values.iter().copied().fold(f64::MAX, f64::min),
                }
            })
        }
    }
}
