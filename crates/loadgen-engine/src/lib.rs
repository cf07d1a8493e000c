//! Concurrent workload engine for db-loadgen.
//!
//! The engine launches workers on a ramp, each owning one backend session
//! and running a bounded loop of weighted Read/Write operations, then
//! aggregates every worker's terminal outcome into a [`RunSummary`].
//!
//! ```text
//!   Driver ──spawns (ramp_delay apart)──▶ Worker 0 … Worker N-1
//!                                            │
//!                                  OperationMix::next(rng)
//!                                            │
//!                                   Session::execute(intent)
//!                                            │
//!   Driver ◀──────── WorkerOutcome ──────────┘
//!      │
//!      ▼
//!   RunSummary + Reporter::complete (once)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use loadgen_engine::{Driver, LoadConfig, MemoryBackend, TargetDescriptor};
//! use std::sync::Arc;
//!
//! let config = LoadConfig::new(TargetDescriptor::default())
//!     .with_worker_count(3)
//!     .with_iterations(5);
//! let summary = Driver::new(Arc::new(MemoryBackend::new()), config)?
//!     .run()
//!     .await;
//! assert_eq!(summary.total_operations, 15);
//! ```

pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod memory;
pub mod mix;
pub mod operation;
pub mod report;
pub mod stop;
pub mod worker;

pub use backend::{Backend, Session};
pub use config::{LoadConfig, TargetDescriptor, DEFAULT_TABLE};
pub use driver::Driver;
pub use error::{ConfigError, ConnectionError, OperationError, ReleaseError};
pub use memory::{MemoryBackend, MemorySession};
pub use mix::{worker_rng, OperationMix, OperationWeights};
pub use operation::{
    AggregateQuery, AggregateRow, OperationIntent, OperationKind, OperationPayload,
    OperationResult, SyntheticRow, WRITE_VALUE_RANGE,
};
pub use report::{Reporter, RunSummary, TracingReporter, WorkerOutcome, WorkerStatus};
pub use stop::{stop_channel, StopHandle, StopSignal};
pub use worker::{Worker, WorkerSpec};
