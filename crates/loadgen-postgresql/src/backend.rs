//! tokio-postgres implementation of the engine's backend traits.

use crate::error::PostgreSQLLoadgenError;
use crate::sql;
use async_trait::async_trait;
use loadgen_engine::{
    AggregateQuery, AggregateRow, Backend, ConnectionError, OperationError, OperationIntent,
    OperationPayload, ReleaseError, Session, SyntheticRow, TargetDescriptor,
};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, NoTls, Row, Statement};
use tracing::{debug, warn};

const APPLICATION_NAME: &str = "db-loadgen";

/// Default bound for the connection task to wind down once the client is
/// dropped.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens one PostgreSQL connection per session.
#[derive(Debug, Clone)]
pub struct PostgresBackend {
    shutdown_timeout: Duration,
}

impl PostgresBackend {
    pub fn new() -> Self {
        Self {
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// How long `close` waits for the connection task before aborting it.
    /// A server that stopped answering keeps the task alive while requests
    /// are still queued.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Connection parameters for `target`.
    pub fn connection_config(target: &TargetDescriptor) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&target.host)
            .port(target.port)
            .dbname(&target.database)
            .user(&target.user)
            .password(&target.credential)
            .ssl_mode(SslMode::Disable)
            .application_name(APPLICATION_NAME);
        config
    }
}

impl Default for PostgresBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    type Session = PostgresSession;

    async fn connect(&self, target: &TargetDescriptor) -> Result<PostgresSession, ConnectionError> {
        let (client, connection) = Self::connection_config(target)
            .connect(NoTls)
            .await
            .map_err(PostgreSQLLoadgenError::from)?;

        // Resolves once the client is dropped, or with the error that broke
        // the connection.
        let connection_task = tokio::spawn(connection);
        debug!("Connected to {}", target.endpoint());

        Ok(PostgresSession {
            client: Some(client),
            connection_task: Some(connection_task),
            table: target.table.clone(),
            insert: None,
            top_worker: None,
            shutdown_timeout: self.shutdown_timeout,
        })
    }

    async fn bootstrap(&self, target: &TargetDescriptor) -> Result<(), OperationError> {
        let mut session = self
            .connect(target)
            .await
            .map_err(|e| OperationError::Backend(e.to_string()))?;

        let created = session.create_table().await;
        if let Err(e) = session.close().await {
            warn!("Bootstrap connection did not close cleanly: {}", e);
        }
        created?;

        debug!("Ensured table {} exists", sql::quote_ident(&target.table));
        Ok(())
    }
}

/// One PostgreSQL connection owned by a worker.
pub struct PostgresSession {
    client: Option<Client>,
    connection_task: Option<JoinHandle<Result<(), tokio_postgres::Error>>>,
    table: String,
    insert: Option<Statement>,
    top_worker: Option<Statement>,
    shutdown_timeout: Duration,
}

impl PostgresSession {
    fn client(&self) -> Result<&Client, PostgreSQLLoadgenError> {
        self.client.as_ref().ok_or(PostgreSQLLoadgenError::Closed)
    }

    async fn create_table(&self) -> Result<(), PostgreSQLLoadgenError> {
        self.client()?
            .execute(&sql::generate_create_table(&self.table), &[])
            .await?;
        Ok(())
    }

    async fn read(&mut self, query: AggregateQuery) -> Result<OperationPayload, PostgreSQLLoadgenError> {
        let client = self.client.as_ref().ok_or(PostgreSQLLoadgenError::Closed)?;
        let row = match query {
            AggregateQuery::TopWorker => {
                let statement =
                    prepared(client, &mut self.top_worker, || sql::generate_top_worker(&self.table))
                        .await?;
                client.query_opt(&statement, &[]).await?
            }
        };

        let aggregate = row.map(|row| decode_aggregate(&row)).transpose()?;
        Ok(OperationPayload::Aggregate(aggregate))
    }

    async fn write(&mut self, row: &SyntheticRow) -> Result<OperationPayload, PostgreSQLLoadgenError> {
        let worker_id = i32::try_from(row.worker_id).map_err(|_| {
            PostgreSQLLoadgenError::Encode(format!("worker id {} exceeds INT", row.worker_id))
        })?;
        let iteration = i32::try_from(row.iteration).map_err(|_| {
            PostgreSQLLoadgenError::Encode(format!("iteration {} exceeds INT", row.iteration))
        })?;
        let value = Decimal::from_f64_retain(row.value).ok_or_else(|| {
            PostgreSQLLoadgenError::Encode(format!("value {} is not a finite decimal", row.value))
        })?;
        let timestamp = row.recorded_at.naive_utc();

        let client = self.client.as_ref().ok_or(PostgreSQLLoadgenError::Closed)?;
        let statement =
            prepared(client, &mut self.insert, || sql::generate_insert(&self.table)).await?;
        client
            .execute(&statement, &[&worker_id, &iteration, &value, &timestamp])
            .await?;

        Ok(OperationPayload::Inserted(row.clone()))
    }
}

#[async_trait]
impl Session for PostgresSession {
    async fn execute(
        &mut self,
        intent: &OperationIntent,
    ) -> Result<OperationPayload, OperationError> {
        let payload = match intent {
            OperationIntent::Read { query, .. } => self.read(*query).await?,
            OperationIntent::Write(row) => self.write(row).await?,
        };
        Ok(payload)
    }

    async fn close(&mut self) -> Result<(), ReleaseError> {
        let client = self.client.take().ok_or(PostgreSQLLoadgenError::Closed)?;
        self.insert = None;
        self.top_worker = None;
        drop(client);

        // The handle stays in `self` until the task is joined, so a caller
        // that cancels this future still leaves it to `Drop` to abort.
        let Some(task) = self.connection_task.as_mut() else {
            return Ok(());
        };
        let joined = tokio::time::timeout(self.shutdown_timeout, task).await;

        match joined {
            Ok(result) => {
                self.connection_task = None;
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(PostgreSQLLoadgenError::from(e).into()),
                    Err(e) => Err(ReleaseError::Task(e.to_string())),
                }
            }
            Err(_) => {
                if let Some(task) = self.connection_task.take() {
                    task.abort();
                }
                warn!(
                    "Connection did not shut down within {:?}; aborted",
                    self.shutdown_timeout
                );
                Err(ReleaseError::Timeout(self.shutdown_timeout))
            }
        }
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
    }
}

/// Prepare the statement on first use and cache it in `slot`.
async fn prepared(
    client: &Client,
    slot: &mut Option<Statement>,
    sql: impl FnOnce() -> String,
) -> Result<Statement, PostgreSQLLoadgenError> {
    if let Some(statement) = slot {
        return Ok(statement.clone());
    }
    let statement = client.prepare(&sql()).await?;
    *slot = Some(statement.clone());
    Ok(statement)
}

fn decode_aggregate(row: &Row) -> Result<AggregateRow, PostgreSQLLoadgenError> {
    let worker_id: i32 = row.try_get(0)?;
    let worker_id = usize::try_from(worker_id).map_err(|_| {
        PostgreSQLLoadgenError::Encode(format!("negative worker id {worker_id} in table"))
    })?;

    Ok(AggregateRow {
        worker_id,
        count: row.try_get(1)?,
        avg: row.try_get(2)?,
        max: row.try_get(3)?,
        min: row.try_get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadgen_engine::{AggregateQuery, OperationIntent};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_postgres::config::Host;

    /// Accept one connection, complete the startup handshake, then read
    /// requests without ever answering them.
    async fn silent_server() -> TargetDescriptor {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let len = socket.read_i32().await.unwrap();
            let mut startup = vec![0u8; (len - 4) as usize];
            socket.read_exact(&mut startup).await.unwrap();

            // AuthenticationOk, ReadyForQuery(idle)
            socket.write_all(&[b'R', 0, 0, 0, 8, 0, 0, 0, 0]).await.unwrap();
            socket.write_all(&[b'Z', 0, 0, 0, 5, b'I']).await.unwrap();

            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        });

        TargetDescriptor::new("127.0.0.1", port, "postgres", "postgres", "x")
    }

    #[tokio::test]
    async fn test_close_after_unanswered_request_is_bounded() {
        let target = silent_server().await;
        let backend = PostgresBackend::new().with_shutdown_timeout(Duration::from_millis(200));
        let mut session = backend.connect(&target).await.unwrap();

        let read = OperationIntent::Read {
            worker_id: 0,
            iteration: 0,
            query: AggregateQuery::TopWorker,
        };
        let executed =
            tokio::time::timeout(Duration::from_millis(200), session.execute(&read)).await;
        assert!(executed.is_err(), "server never answers");

        let closed = tokio::time::timeout(Duration::from_secs(5), session.close())
            .await
            .expect("close must finish within its shutdown timeout");
        assert!(matches!(closed, Err(ReleaseError::Timeout(_))));
        assert!(session.connection_task.is_none());
        assert!(matches!(
            session.close().await,
            Err(ReleaseError::AlreadyClosed)
        ));
    }

    #[test]
    fn test_connection_config_from_target() {
        let target = TargetDescriptor::new("db.internal", 5433, "bench", "loader", "hunter2");
        let config = PostgresBackend::connection_config(&target);

        assert_eq!(config.get_hosts(), &[Host::Tcp("db.internal".to_string())]);
        assert_eq!(config.get_ports(), &[5433]);
        assert_eq!(config.get_dbname(), Some("bench"));
        assert_eq!(config.get_user(), Some("loader"));
        assert_eq!(config.get_password(), Some(&b"hunter2"[..]));
        assert_eq!(config.get_application_name(), Some(APPLICATION_NAME));
        assert_eq!(config.get_ssl_mode(), SslMode::Disable);
    }

    #[tokio::test]
    async fn test_unreachable_port_is_connection_error() {
        // Port 1 on loopback refuses immediately.
        let target = TargetDescriptor::new("127.0.0.1", 1, "postgres", "postgres", "x");
        let result = PostgresBackend::new().connect(&target).await;
        assert!(matches!(result, Err(ConnectionError::Backend(_))));
    }
}
