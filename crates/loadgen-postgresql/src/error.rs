//! Error types for the PostgreSQL backend.

use loadgen_engine::{ConnectionError, OperationError, ReleaseError};
use thiserror::Error;

/// Errors raised while talking to PostgreSQL.
#[derive(Error, Debug)]
pub enum PostgreSQLLoadgenError {
    /// PostgreSQL connection or query error.
    #[error("PostgreSQL error: {0}")]
    PostgreSQL(#[from] tokio_postgres::Error),

    /// A generated value does not fit its column.
    #[error("Encode error: {0}")]
    Encode(String),

    /// The session was already closed.
    #[error("Session is closed")]
    Closed,
}

impl From<PostgreSQLLoadgenError> for ConnectionError {
    fn from(e: PostgreSQLLoadgenError) -> Self {
        ConnectionError::Backend(e.to_string())
    }
}

impl From<PostgreSQLLoadgenError> for OperationError {
    fn from(e: PostgreSQLLoadgenError) -> Self {
        match e {
            PostgreSQLLoadgenError::Encode(msg) => OperationError::Encode(msg),
            other => OperationError::Backend(other.to_string()),
        }
    }
}

impl From<PostgreSQLLoadgenError> for ReleaseError {
    fn from(e: PostgreSQLLoadgenError) -> Self {
        match e {
            PostgreSQLLoadgenError::Closed => ReleaseError::AlreadyClosed,
            other => ReleaseError::Backend(other.to_string()),
        }
    }
}
