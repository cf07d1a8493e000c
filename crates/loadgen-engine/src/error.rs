//! Error types for the workload engine.

use std::time::Duration;
use thiserror::Error;

/// A backend session could not be acquired.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Error reported by the backend client.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The connection attempt exceeded the configured connect timeout.
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The target refused or could not be reached.
    #[error("Target {0} is unreachable")]
    Unreachable(String),
}

/// A Read or Write operation failed.
#[derive(Error, Debug)]
pub enum OperationError {
    /// Error reported by the backend client.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The operation exceeded the configured operation timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A value could not be encoded for the backend.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Failure injected by the in-memory backend.
    #[error("Injected failure for worker {worker_id} at iteration {iteration}")]
    Injected { worker_id: usize, iteration: u64 },
}

/// Closing a session failed. Logged only; never changes a worker's outcome.
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Error reported by the backend client while shutting down.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The task driving the connection could not be joined.
    #[error("Connection task error: {0}")]
    Task(String),

    /// Releasing the session exceeded its time bound.
    #[error("Close timed out after {0:?}")]
    Timeout(Duration),

    /// The session had already been closed.
    #[error("Session already closed")]
    AlreadyClosed,
}

/// Invalid load configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Operation weights could not be parsed or sum to zero.
    #[error("Invalid operation weights: {0}")]
    InvalidWeights(String),

    /// An operation kind name was not recognised.
    #[error("Unknown operation kind '{0}' (expected read or write)")]
    UnknownOperation(String),

    /// The run would not launch any worker.
    #[error("Worker count must be at least 1")]
    NoWorkers,
}
