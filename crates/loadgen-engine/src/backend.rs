//! Backend client capability set consumed by workers.

use crate::config::TargetDescriptor;
use crate::error::{ConnectionError, OperationError, ReleaseError};
use crate::operation::{OperationIntent, OperationPayload};
use async_trait::async_trait;

/// Opens sessions against a target store.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    type Session: Session;

    /// Acquire a session. Each worker owns the session it acquires.
    async fn connect(&self, target: &TargetDescriptor) -> Result<Self::Session, ConnectionError>;

    /// Ensure the target table exists. Must be idempotent.
    async fn bootstrap(&self, target: &TargetDescriptor) -> Result<(), OperationError>;
}

/// A single backend session.
#[async_trait]
pub trait Session: Send + 'static {
    /// Execute one operation.
    async fn execute(&mut self, intent: &OperationIntent)
        -> Result<OperationPayload, OperationError>;

    /// Release the session. Workers call this exactly once.
    async fn close(&mut self) -> Result<(), ReleaseError>;
}
