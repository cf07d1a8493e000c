//! A worker: one backend session running a bounded loop of operations.
//!
//! ```text
//! Init -> Connecting -> Running -> Closing -> Terminated{Completed | OperationFailed}
//!              |
//!              +----------------------------> Terminated{ConnectionFailed}
//! ```

use crate::backend::{Backend, Session};
use crate::config::TargetDescriptor;
use crate::error::{ConnectionError, OperationError, ReleaseError};
use crate::mix::{worker_rng, OperationMix};
use crate::operation::{OperationIntent, OperationResult};
use crate::report::{Reporter, WorkerOutcome, WorkerStatus};
use crate::stop::StopSignal;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-worker parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Position in the ramp, `0..worker_count`.
    pub worker_id: usize,
    pub iterations: u64,
    pub pacing: Duration,
    /// Planned launch time relative to the start of the ramp.
    pub launch_delay: Duration,
    pub operation_timeout: Duration,
    pub connect_timeout: Duration,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Init,
    Connecting,
    Running,
    Closing,
    Terminated(WorkerStatus),
}

/// How the Running phase ended.
struct RunProgress {
    completed: u64,
    stopped_early: bool,
    failure: Option<OperationError>,
}

pub struct Worker<B: Backend> {
    spec: WorkerSpec,
    backend: Arc<B>,
    target: Arc<TargetDescriptor>,
    mix: Arc<OperationMix>,
    reporter: Arc<dyn Reporter>,
    stop: StopSignal,
    launch_offset: Duration,
    state: WorkerState,
}

impl<B: Backend> Worker<B> {
    pub fn new(
        spec: WorkerSpec,
        backend: Arc<B>,
        target: Arc<TargetDescriptor>,
        mix: Arc<OperationMix>,
        reporter: Arc<dyn Reporter>,
        stop: StopSignal,
    ) -> Self {
        Self {
            spec,
            backend,
            target,
            mix,
            reporter,
            stop,
            launch_offset: Duration::ZERO,
            state: WorkerState::Init,
        }
    }

    /// Actual launch time relative to the start of the run.
    pub fn with_launch_offset(mut self, offset: Duration) -> Self {
        self.launch_offset = offset;
        self
    }

    pub fn worker_id(&self) -> usize {
        self.spec.worker_id
    }

    /// Run the worker to a terminal state.
    ///
    /// The session is closed on every path that acquired one; the Running
    /// phase reports failures as values so Closing always follows it. Close is
    /// bounded by the operation timeout; a close that overruns it is reported
    /// as a `ReleaseError` and the session is dropped.
    pub async fn execute(mut self) -> WorkerOutcome {
        self.transition(WorkerState::Connecting);

        let connect_timeout = self.spec.connect_timeout;
        let connected =
            match tokio::time::timeout(connect_timeout, self.backend.connect(&self.target)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout(connect_timeout)),
            };

        let mut session = match connected {
            Ok(session) => session,
            Err(e) => {
                self.transition(WorkerState::Terminated(WorkerStatus::ConnectionFailed));
                return self.outcome(0, WorkerStatus::ConnectionFailed, Some(e.to_string()), false);
            }
        };

        self.transition(WorkerState::Running);
        let progress = self.run_iterations(&mut session).await;

        self.transition(WorkerState::Closing);
        let close_timeout = self.spec.operation_timeout;
        let closed = match tokio::time::timeout(close_timeout, session.close()).await {
            Ok(result) => result,
            Err(_) => Err(ReleaseError::Timeout(close_timeout)),
        };
        self.reporter
            .session_closed(self.spec.worker_id, closed.as_ref().map(|_| ()));

        let (status, last_error) = match progress.failure {
            None => (WorkerStatus::Completed, None),
            Some(e) => (WorkerStatus::OperationFailed, Some(e.to_string())),
        };
        self.transition(WorkerState::Terminated(status));
        self.outcome(
            progress.completed,
            status,
            last_error,
            progress.stopped_early,
        )
    }

    async fn run_iterations(&mut self, session: &mut B::Session) -> RunProgress {
        let worker_id = self.spec.worker_id;
        let operation_timeout = self.spec.operation_timeout;
        let mut rng = worker_rng(self.spec.seed, worker_id);
        let mut completed = 0;

        for iteration in 0..self.spec.iterations {
            if self.stop.is_raised() {
                return RunProgress {
                    completed,
                    stopped_early: true,
                    failure: None,
                };
            }

            let kind = self.mix.next(&mut rng);
            let intent = OperationIntent::generate(kind, worker_id, iteration, &mut rng);

            let executed =
                match tokio::time::timeout(operation_timeout, session.execute(&intent)).await {
                    Ok(result) => result,
                    Err(_) => Err(OperationError::Timeout(operation_timeout)),
                };

            match executed {
                Ok(payload) => {
                    self.reporter.operation(
                        worker_id,
                        &OperationResult::succeeded(kind, iteration, payload),
                    );
                    completed += 1;
                }
                Err(e) => {
                    self.reporter
                        .operation(worker_id, &OperationResult::failed(kind, iteration, &e));
                    return RunProgress {
                        completed,
                        stopped_early: false,
                        failure: Some(e),
                    };
                }
            }

            let is_last = iteration + 1 == self.spec.iterations;
            if !is_last && !self.pace().await {
                return RunProgress {
                    completed,
                    stopped_early: true,
                    failure: None,
                };
            }
        }

        RunProgress {
            completed,
            stopped_early: false,
            failure: None,
        }
    }

    /// Wait out the pacing interval. Returns `false` if the stop signal was
    /// raised before or during the wait.
    async fn pace(&mut self) -> bool {
        let pacing = self.spec.pacing;
        if pacing.is_zero() {
            return !self.stop.is_raised();
        }

        tokio::select! {
            _ = tokio::time::sleep(pacing) => {}
            _ = self.stop.raised() => return false,
        }
        !self.stop.is_raised()
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(
            "Worker {}: {:?} -> {:?}",
            self.spec.worker_id, self.state, next
        );
        self.state = next;
    }

    fn outcome(
        &self,
        iterations_completed: u64,
        status: WorkerStatus,
        last_error: Option<String>,
        stopped_early: bool,
    ) -> WorkerOutcome {
        WorkerOutcome {
            worker_id: self.spec.worker_id,
            iterations_completed,
            status,
            last_error,
            launch_offset: self.launch_offset,
            stopped_early,
        }
    }
}
