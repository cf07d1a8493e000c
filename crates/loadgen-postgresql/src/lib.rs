//! PostgreSQL backend for db-loadgen.
//!
//! Each worker session owns one `tokio_postgres::Client` whose connection
//! future runs on its own task. Closing a session drops the client and joins
//! that task, so every connection is released before the worker reports.

pub mod args;
pub mod backend;
pub mod error;
pub mod sql;

pub use args::PostgreSQLTargetArgs;
pub use backend::{PostgresBackend, PostgresSession};
pub use error::PostgreSQLLoadgenError;
