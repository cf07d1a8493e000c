//! Workload driver: ramps workers up, waits for all of them, and reports.

use crate::backend::Backend;
use crate::config::{LoadConfig, TargetDescriptor};
use crate::error::ConfigError;
use crate::mix::OperationMix;
use crate::report::{Reporter, RunSummary, TracingReporter, WorkerOutcome};
use crate::stop::StopSignal;
use crate::worker::Worker;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Launches workers on a ramp and aggregates their outcomes.
pub struct Driver<B: Backend> {
    backend: Arc<B>,
    config: LoadConfig,
    target: Arc<TargetDescriptor>,
    mix: Arc<OperationMix>,
    reporter: Arc<dyn Reporter>,
    stop: StopSignal,
}

impl<B: Backend> Driver<B> {
    /// Create a driver for `config`. Fails if the configuration is invalid.
    pub fn new(backend: Arc<B>, config: LoadConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mix = OperationMix::new(&config.weights)?;
        let target = Arc::new(config.target.clone());

        Ok(Self {
            backend,
            config,
            target,
            mix: Arc::new(mix),
            reporter: Arc::new(TracingReporter),
            stop: StopSignal::never(),
        })
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Run the workload to completion.
    ///
    /// Worker failures are isolated: they show up in the summary and never
    /// abort the run or sibling workers.
    pub async fn run(self) -> RunSummary {
        let started = Instant::now();
        let mut stop = self.stop.clone();
        let mut tally = Tally::new(self.reporter.clone());
        let mut tasks: JoinSet<WorkerOutcome> = JoinSet::new();

        info!(
            "Starting load: {} workers, {} iterations each, ramp delay {:?}, pacing {:?}, mix {}",
            self.config.worker_count,
            self.config.iterations_per_worker,
            self.config.ramp_delay,
            self.config.pacing,
            self.mix.weights()
        );

        self.bootstrap().await;

        for worker_id in 0..self.config.worker_count {
            if worker_id > 0 && !self.ramp_wait(&mut tasks, &mut tally, &mut stop).await {
                break;
            }
            if stop.is_raised() {
                break;
            }

            let launch_offset = started.elapsed();
            let spec = self.config.worker_spec(worker_id);
            let planned = spec.launch_delay;
            let worker = Worker::new(
                spec,
                self.backend.clone(),
                self.target.clone(),
                self.mix.clone(),
                self.reporter.clone(),
                stop.clone(),
            )
            .with_launch_offset(launch_offset);

            tally.launched(worker_id, launch_offset);
            tasks.spawn(async move {
                match AssertUnwindSafe(worker.execute()).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => WorkerOutcome::lost(
                        worker_id,
                        launch_offset,
                        format!("worker panicked: {}", panic_message(panic.as_ref())),
                    ),
                }
            });
            debug!(
                "Launched worker {} at {:?} (planned {:?})",
                worker_id, launch_offset, planned
            );
        }

        if tally.launched_count() < self.config.worker_count {
            info!(
                "Stop requested: launched {} of {} workers",
                tally.launched_count(),
                self.config.worker_count
            );
        }

        while let Some(joined) = tasks.join_next().await {
            tally.collect(joined);
        }

        let summary = tally.finish();
        info!("All workers finished in {:?}", started.elapsed());
        self.reporter.complete(&summary);
        summary
    }

    /// Ensure the target table exists. Bounded by the connect and operation
    /// timeouts; a failure or overrun is logged and the run goes on.
    async fn bootstrap(&self) {
        let limit = self
            .config
            .connect_timeout
            .saturating_add(self.config.operation_timeout);

        match tokio::time::timeout(limit, self.backend.bootstrap(&self.target)).await {
            Ok(Ok(())) => debug!("Table '{}' is ready", self.target.table),
            Ok(Err(e)) => warn!(
                "Could not ensure table '{}' exists: {}",
                self.target.table, e
            ),
            Err(_) => warn!(
                "Could not ensure table '{}' exists: bootstrap timed out after {:?}",
                self.target.table, limit
            ),
        }
    }

    /// Wait out the ramp delay, collecting outcomes of workers that finish
    /// meanwhile. Returns `false` if the stop signal was raised.
    async fn ramp_wait(
        &self,
        tasks: &mut JoinSet<WorkerOutcome>,
        tally: &mut Tally,
        stop: &mut StopSignal,
    ) -> bool {
        let delay = tokio::time::sleep(self.config.ramp_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                _ = &mut delay => return true,
                _ = stop.raised() => return false,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => tally.collect(joined),
            }
        }
    }
}

/// Incremental aggregation of worker outcomes.
struct Tally {
    summary: RunSummary,
    /// Launched workers without an outcome yet, with their launch offsets.
    pending: BTreeMap<usize, Duration>,
    launched: usize,
    reporter: Arc<dyn Reporter>,
}

impl Tally {
    fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            summary: RunSummary::default(),
            pending: BTreeMap::new(),
            launched: 0,
            reporter,
        }
    }

    fn launched(&mut self, worker_id: usize, launch_offset: Duration) {
        self.pending.insert(worker_id, launch_offset);
        self.launched += 1;
    }

    fn launched_count(&self) -> usize {
        self.launched
    }

    fn collect(&mut self, joined: Result<WorkerOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.record(outcome),
            Err(e) => error!("Worker task could not be joined: {}", e),
        }
    }

    fn record(&mut self, outcome: WorkerOutcome) {
        if self.pending.remove(&outcome.worker_id).is_none() {
            warn!("Duplicate outcome for worker {} ignored", outcome.worker_id);
            return;
        }
        self.reporter.report(&outcome);
        self.summary.record(outcome);
    }

    /// Synthesize outcomes for workers whose task ended without one, then
    /// finalize the summary.
    fn finish(mut self) -> RunSummary {
        let lost = std::mem::take(&mut self.pending);
        for (worker_id, launch_offset) in lost {
            let outcome = WorkerOutcome::lost(worker_id, launch_offset, "worker task was lost");
            self.reporter.report(&outcome);
            self.summary.record(outcome);
        }
        self.summary.finalize()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
