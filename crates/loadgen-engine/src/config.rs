//! Configuration types for a load run.

use crate::error::ConfigError;
use crate::mix::OperationWeights;
use crate::worker::WorkerSpec;
use std::fmt;
use std::time::Duration;

/// Table the workload reads from and writes to.
pub const DEFAULT_TABLE: &str = "load_test_table";

/// Where the load is sent. Immutable once the run starts.
#[derive(Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub credential: String,
    /// Target table for Reads and Writes.
    pub table: String,
}

impl TargetDescriptor {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            credential: credential.into(),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// `host:port/database`, for log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Default for TargetDescriptor {
    fn default() -> Self {
        Self::new("localhost", 30007, "postgres", "postgres", "default_password")
    }
}

impl fmt::Debug for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("credential", &"<redacted>")
            .field("table", &self.table)
            .finish()
    }
}

/// Configuration for a load run.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Backend target shared by every worker.
    pub target: TargetDescriptor,
    /// Number of workers to launch.
    pub worker_count: usize,
    /// Delay between successive worker launches.
    pub ramp_delay: Duration,
    /// Iterations each worker runs.
    pub iterations_per_worker: u64,
    /// Read/Write mix.
    pub weights: OperationWeights,
    /// Wait between iterations of one worker.
    pub pacing: Duration,
    /// Upper bound for a single backend operation.
    pub operation_timeout: Duration,
    /// Upper bound for acquiring a session.
    pub connect_timeout: Duration,
    /// Seed for reproducible operation mixes (entropy when unset).
    pub seed: Option<u64>,
}

impl LoadConfig {
    /// Create a configuration with the default workload shape.
    pub fn new(target: TargetDescriptor) -> Self {
        Self {
            target,
            worker_count: 150,
            ramp_delay: Duration::from_secs(30),
            iterations_per_worker: 2000,
            weights: OperationWeights::uniform(),
            pacing: Duration::from_millis(500),
            operation_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            seed: None,
        }
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    pub fn with_ramp_delay(mut self, delay: Duration) -> Self {
        self.ramp_delay = delay;
        self
    }

    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations_per_worker = iterations;
        self
    }

    pub fn with_weights(mut self, weights: OperationWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::NoWorkers);
        }
        self.weights.validate()
    }

    /// Parameters for the worker launched at position `worker_id` of the ramp.
    pub fn worker_spec(&self, worker_id: usize) -> WorkerSpec {
        let position = u32::try_from(worker_id).unwrap_or(u32::MAX);
        WorkerSpec {
            worker_id,
            iterations: self.iterations_per_worker,
            pacing: self.pacing,
            launch_delay: self.ramp_delay.saturating_mul(position),
            operation_timeout: self.operation_timeout,
            connect_timeout: self.connect_timeout,
            seed: self.seed,
        }
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self::new(TargetDescriptor::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationKind;

    #[test]
    fn test_config_builder() {
        let config = LoadConfig::new(TargetDescriptor::default().with_table("bench"))
            .with_worker_count(3)
            .with_ramp_delay(Duration::from_millis(250))
            .with_iterations(5)
            .with_weights(OperationWeights::empty().with(OperationKind::Write, 1))
            .with_pacing(Duration::ZERO)
            .with_seed(Some(42));

        assert_eq!(config.worker_count, 3);
        assert_eq!(config.iterations_per_worker, 5);
        assert_eq!(config.target.table, "bench");
        assert_eq!(config.seed, Some(42));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = LoadConfig::default().with_worker_count(0);
        assert_eq!(config.validate(), Err(ConfigError::NoWorkers));
    }

    #[test]
    fn test_worker_spec_launch_delay() {
        let config = LoadConfig::default().with_ramp_delay(Duration::from_secs(2));

        assert_eq!(config.worker_spec(0).launch_delay, Duration::ZERO);
        assert_eq!(config.worker_spec(3).launch_delay, Duration::from_secs(6));
        assert_eq!(config.worker_spec(3).worker_id, 3);
    }

    #[test]
    fn test_debug_redacts_credential() {
        let target = TargetDescriptor::new("db", 5432, "app", "loader", "hunter2");
        let debug = format!("{target:?}");

        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
        assert_eq!(target.endpoint(), "db:5432/app");
    }
}
