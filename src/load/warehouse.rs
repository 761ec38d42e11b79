//! Warehouse backend: session seam and the sqlx implementation.
//!
//! The raw table is append-only:
//!
//! | column                | type                          |
//! |-----------------------|-------------------------------|
//! | `RAW_DATA`            | JSON text, validated on write |
//! | `INGESTION_TIMESTAMP` | defaults to write time        |
//! | `BATCH_ID`            | text                          |
//!
//! It is created when absent and never dropped or migrated here.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Connection, Sqlite};
use tracing::{debug, instrument, warn};

use super::error::{WarehouseError, WarehouseErrorKind};
use crate::credentials::WarehouseCredentials;

/// Destination table for raw study documents.
pub const RAW_TABLE: &str = "RAW_CTGOV_STUDIES";

const CREATE_RAW_TABLE: &str = "CREATE TABLE IF NOT EXISTS RAW_CTGOV_STUDIES (
    RAW_DATA TEXT NOT NULL CHECK (json_valid(RAW_DATA)),
    INGESTION_TIMESTAMP TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    BATCH_ID TEXT NOT NULL
)";

const INSERT_RAW_ROW: &str = "INSERT INTO RAW_CTGOV_STUDIES (RAW_DATA, INGESTION_TIMESTAMP, BATCH_ID)
    VALUES (json(?), CURRENT_TIMESTAMP, ?)";

/// Pool size; one run uses a single session.
const DEFAULT_MAX_CONNECTIONS: u32 = 2;

/// Busy timeout so concurrent runs wait for each other's chunk commits.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One exclusive connection to the warehouse with explicit transactions.
#[async_trait]
pub trait WarehouseSession: Send {
    /// Creates the raw table when absent.
    async fn ensure_table(&mut self) -> Result<(), WarehouseError>;

    /// Opens a transaction.
    async fn begin(&mut self) -> Result<(), WarehouseError>;

    /// Inserts one row inside the open transaction.
    async fn insert_row(&mut self, raw_json: &str, batch_id: &str) -> Result<(), WarehouseError>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> Result<(), WarehouseError>;

    /// Rolls back the open transaction; a no-op when none is open.
    async fn rollback(&mut self) -> Result<(), WarehouseError>;

    /// Releases the connection. Further calls fail with `InvalidState`.
    async fn close(&mut self) -> Result<(), WarehouseError>;
}

/// Opens warehouse sessions.
#[async_trait]
pub trait WarehouseConnector: Send + Sync {
    /// Acquires a session.
    async fn open_session(&self) -> Result<Box<dyn WarehouseSession>, WarehouseError>;

    /// Human-readable destination for logs and reports.
    fn describe(&self) -> String;
}

/// Backend status reported by [`SqlWarehouse::ping`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingReport {
    /// Database engine version string.
    pub version: String,
    /// Rows in the raw table, or `None` when the table does not exist yet.
    pub raw_rows: Option<i64>,
}

/// sqlx-backed warehouse (SQLite driver).
#[derive(Debug, Clone)]
pub struct SqlWarehouse {
    pool: SqlitePool,
    label: String,
    credentials: Option<WarehouseCredentials>,
}

impl SqlWarehouse {
    /// Prepares a pool for `url` without connecting.
    ///
    /// The first connection is made when a session is opened, so building
    /// the sink never touches the network.
    ///
    /// # Errors
    ///
    /// Returns `Unreachable` if the URL cannot be parsed.
    pub fn open_lazy(url: &str, label: impl Into<String>) -> Result<Self, WarehouseError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| WarehouseError::new("configure", WarehouseErrorKind::Unreachable, e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_lazy_with(options);

        Ok(Self {
            pool,
            label: label.into(),
            credentials: None,
        })
    }

    /// Creates an in-memory warehouse for tests and dry runs.
    ///
    /// Uses a single long-lived connection so all sessions see the same data.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    #[instrument]
    pub async fn in_memory() -> Result<Self, WarehouseError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| WarehouseError::sqlx("connect", &e))?;

        Ok(Self {
            pool,
            label: "memory".to_string(),
            credentials: None,
        })
    }

    /// Attaches the login that sessions authenticate as.
    #[must_use]
    pub fn with_credentials(mut self, credentials: WarehouseCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Returns the attached login, if any.
    #[must_use]
    pub fn credentials(&self) -> Option<&WarehouseCredentials> {
        self.credentials.as_ref()
    }

    /// Returns the underlying pool for direct queries.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reports engine version and raw-table row count.
    ///
    /// # Errors
    ///
    /// Returns an error if the warehouse cannot be queried.
    #[instrument(skip(self), fields(warehouse = %self.label))]
    pub async fn ping(&self) -> Result<PingReport, WarehouseError> {
        let (version,): (String,) = sqlx::query_as("SELECT sqlite_version()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| WarehouseError::sqlx("ping", &e))?;

        let (tables,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(RAW_TABLE)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| WarehouseError::sqlx("ping", &e))?;

        let raw_rows = if tables == 0 {
            None
        } else {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM RAW_CTGOV_STUDIES")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| WarehouseError::sqlx("ping", &e))?;
            Some(count)
        };

        Ok(PingReport { version, raw_rows })
    }

    /// Gracefully closes all pooled connections.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl WarehouseConnector for SqlWarehouse {
    async fn open_session(&self) -> Result<Box<dyn WarehouseSession>, WarehouseError> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| WarehouseError::sqlx("connect", &e))?;
        let identity = self
            .credentials
            .as_ref()
            .map_or_else(|| "anonymous".to_string(), WarehouseCredentials::identity);
        debug!(warehouse = %self.label, %identity, "warehouse session opened");
        Ok(Box::new(SqlSession {
            conn: Some(conn),
            in_transaction: false,
        }))
    }

    fn describe(&self) -> String {
        format!("{RAW_TABLE} @ {}", self.label)
    }
}

struct SqlSession {
    conn: Option<PoolConnection<Sqlite>>,
    in_transaction: bool,
}

impl SqlSession {
    fn conn(&mut self, operation: &'static str) -> Result<&mut PoolConnection<Sqlite>, WarehouseError> {
        self.conn.as_mut().ok_or_else(|| {
            WarehouseError::new(operation, WarehouseErrorKind::InvalidState, "session closed")
        })
    }

    async fn raw(&mut self, operation: &'static str, sql: &'static str) -> Result<(), WarehouseError> {
        let conn = self.conn(operation)?;
        sqlx::Executor::execute(&mut **conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| WarehouseError::sqlx(operation, &e))?;
        Ok(())
    }
}

#[async_trait]
impl WarehouseSession for SqlSession {
    async fn ensure_table(&mut self) -> Result<(), WarehouseError> {
        self.raw("ensure_table", CREATE_RAW_TABLE).await
    }

    async fn begin(&mut self) -> Result<(), WarehouseError> {
        if self.in_transaction {
            return Err(WarehouseError::new(
                "begin",
                WarehouseErrorKind::InvalidState,
                "transaction already open",
            ));
        }
        self.raw("begin", "BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn insert_row(&mut self, raw_json: &str, batch_id: &str) -> Result<(), WarehouseError> {
        let conn = self.conn("insert")?;
        sqlx::query(INSERT_RAW_ROW)
            .bind(raw_json)
            .bind(batch_id)
            .execute(&mut **conn)
            .await
            .map_err(|e| WarehouseError::sqlx("insert", &e))?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), WarehouseError> {
        self.raw("commit", "COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), WarehouseError> {
        if !self.in_transaction {
            return Ok(());
        }
        let result = self.raw("rollback", "ROLLBACK").await;
        self.in_transaction = false;
        if result.is_err() {
            // The connection may still hold the transaction; never pool it again.
            if let Some(conn) = self.conn.take() {
                warn!("rollback failed; discarding connection");
                let _ = conn.detach().close().await;
            }
        }
        result
    }

    async fn close(&mut self) -> Result<(), WarehouseError> {
        if self.in_transaction {
            warn!("closing session with open transaction; rolling back");
            self.rollback().await?;
        }
        // Dropping returns the connection to the pool.
        self.conn.take();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn session(warehouse: &SqlWarehouse) -> Box<dyn WarehouseSession> {
        warehouse.open_session().await.unwrap()
    }

    async fn raw_count(warehouse: &SqlWarehouse) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM RAW_CTGOV_STUDIES")
            .fetch_one(warehouse.pool())
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.ensure_table().await.unwrap();
        s.close().await.unwrap();
        assert_eq!(raw_count(&warehouse).await, 0);
    }

    #[tokio::test]
    async fn test_commit_makes_rows_visible() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.begin().await.unwrap();
        s.insert_row(r#"{"NCTId":"NCT1"}"#, "b1").await.unwrap();
        s.commit().await.unwrap();
        s.close().await.unwrap();

        assert_eq!(raw_count(&warehouse).await, 1);
        let (batch, ts): (String, String) =
            sqlx::query_as("SELECT BATCH_ID, INGESTION_TIMESTAMP FROM RAW_CTGOV_STUDIES")
                .fetch_one(warehouse.pool())
                .await
                .unwrap();
        assert_eq!(batch, "b1");
        assert!(!ts.is_empty(), "ingestion timestamp must be defaulted");
    }

    #[tokio::test]
    async fn test_rollback_discards_rows() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.begin().await.unwrap();
        s.insert_row("{}", "b1").await.unwrap();
        s.rollback().await.unwrap();
        s.close().await.unwrap();
        assert_eq!(raw_count(&warehouse).await, 0);
    }

    #[tokio::test]
    async fn test_close_rolls_back_open_transaction() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.begin().await.unwrap();
        s.insert_row("{}", "b1").await.unwrap();
        s.close().await.unwrap();
        assert_eq!(raw_count(&warehouse).await, 0);
    }

    #[tokio::test]
    async fn test_malformed_json_rejected() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.begin().await.unwrap();
        let err = s.insert_row("{not json", "b1").await.unwrap_err();
        assert_eq!(err.operation, "insert");
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_rejects_operations() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let mut s = session(&warehouse).await;
        s.close().await.unwrap();
        let err = s.ensure_table().await.unwrap_err();
        assert_eq!(err.kind, WarehouseErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_double_begin_rejected() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let mut s = session(&warehouse).await;
        s.begin().await.unwrap();
        let err = s.begin().await.unwrap_err();
        assert_eq!(err.kind, WarehouseErrorKind::InvalidState);
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_before_and_after_table() {
        let warehouse = SqlWarehouse::in_memory().await.unwrap();
        let report = warehouse.ping().await.unwrap();
        assert!(!report.version.is_empty());
        assert_eq!(report.raw_rows, None);

        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.close().await.unwrap();
        assert_eq!(warehouse.ping().await.unwrap().raw_rows, Some(0));
    }

    #[tokio::test]
    async fn test_failed_rollback_discards_connection() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("wh.db").display());
        let warehouse = SqlWarehouse::open_lazy(&url, "file").unwrap();

        // Claims a transaction the connection never began, so ROLLBACK fails.
        let mut s = SqlSession {
            conn: Some(warehouse.pool().acquire().await.unwrap()),
            in_transaction: true,
        };
        assert!(s.rollback().await.is_err());
        assert!(s.conn.is_none());
        assert!(!s.in_transaction);

        let err = s.begin().await.unwrap_err();
        assert_eq!(err.kind, WarehouseErrorKind::InvalidState);
        s.close().await.unwrap();
        warehouse.close().await;
    }

    #[tokio::test]
    async fn test_credentials_attached_to_warehouse() {
        let warehouse = SqlWarehouse::in_memory()
            .await
            .unwrap()
            .with_credentials(WarehouseCredentials::new("acct", "loader", "pw"));
        assert_eq!(warehouse.credentials().unwrap().identity(), "loader@acct");
        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_lazy_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("wh.db").display());
        let warehouse = SqlWarehouse::open_lazy(&url, "file").unwrap();
        assert!(warehouse.describe().contains(RAW_TABLE));

        let mut s = session(&warehouse).await;
        s.ensure_table().await.unwrap();
        s.close().await.unwrap();
        assert_eq!(warehouse.ping().await.unwrap().raw_rows, Some(0));
        warehouse.close().await;
    }
}
