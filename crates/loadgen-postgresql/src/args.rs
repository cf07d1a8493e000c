//! CLI argument definitions for the PostgreSQL target.

use clap::Args;
use loadgen_engine::{TargetDescriptor, DEFAULT_TABLE};
use std::fmt;

/// Connection arguments for the PostgreSQL target.
///
/// Every flag falls back to an environment variable (`DB_HOST`, `DB_PORT`,
/// `DB_NAME`, `DB_USER`, `POSTGRES_PASSWORD`).
#[derive(Args, Clone)]
pub struct PostgreSQLTargetArgs {
    /// PostgreSQL host
    #[arg(long, env = "DB_HOST", default_value = "localhost")]
    pub db_host: String,

    /// PostgreSQL port
    #[arg(long, env = "DB_PORT", default_value = "30007")]
    pub db_port: u16,

    /// Database name
    #[arg(long, env = "DB_NAME", default_value = "postgres")]
    pub db_name: String,

    /// Database user
    #[arg(long, env = "DB_USER", default_value = "postgres")]
    pub db_user: String,

    /// Database password
    #[arg(
        long,
        env = "POSTGRES_PASSWORD",
        default_value = "default_password",
        hide_env_values = true,
        hide_default_value = true
    )]
    pub db_password: String,

    /// Table the workload reads from and writes to
    #[arg(long, env = "LOADGEN_TABLE", default_value = DEFAULT_TABLE)]
    pub table: String,
}

impl PostgreSQLTargetArgs {
    pub fn into_target(self) -> TargetDescriptor {
        TargetDescriptor::new(
            self.db_host,
            self.db_port,
            self.db_name,
            self.db_user,
            self.db_password,
        )
        .with_table(self.table)
    }
}

impl fmt::Debug for PostgreSQLTargetArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgreSQLTargetArgs")
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &"<redacted>")
            .field("table", &self.table)
            .finish()
    }
}
