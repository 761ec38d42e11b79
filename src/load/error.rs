//! Error types for sinks and the warehouse backend.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Structured classification for warehouse failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseErrorKind {
    /// Destination could not be reached or opened.
    Unreachable,
    /// Database returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (check/not-null), e.g. malformed JSON payload.
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Operation issued in an invalid session state.
    InvalidState,
    /// Unclassified database failure.
    Other,
}

impl WarehouseErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Configuration(_) => {
                Self::Unreachable
            }
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for WarehouseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unreachable => "unreachable",
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::InvalidState => "invalid_state",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> WarehouseErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return WarehouseErrorKind::BusyOrLocked;
    }

    if database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT") || value.starts_with("19"))
    {
        return WarehouseErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return WarehouseErrorKind::BusyOrLocked;
    }
    if message.contains("malformed json") {
        return WarehouseErrorKind::ConstraintViolation;
    }

    WarehouseErrorKind::Other
}

/// Errors raised by a warehouse session.
#[derive(Debug, Clone, Error)]
#[error("warehouse {operation} failed ({kind}): {message}")]
pub struct WarehouseError {
    /// Session operation that failed (`connect`, `insert`, `commit`, ...).
    pub operation: &'static str,
    /// Typed classification.
    pub kind: WarehouseErrorKind,
    /// Human-readable driver error text.
    pub message: String,
}

impl WarehouseError {
    /// Creates an error for `operation`.
    pub fn new(operation: &'static str, kind: WarehouseErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
        }
    }

    /// Wraps a driver error with the operation it interrupted.
    #[must_use]
    pub fn sqlx(operation: &'static str, error: &sqlx::Error) -> Self {
        Self::new(operation, WarehouseErrorKind::from_sqlx(error), error.to_string())
    }
}

/// Errors surfaced by a sink's `store`.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Warehouse write failed; rows from earlier committed chunks remain.
    #[error("load of batch {batch_id} failed after {committed}/{total} committed rows: {source}")]
    Warehouse {
        /// Batch being written.
        batch_id: String,
        /// Rows durably committed before the failure.
        committed: usize,
        /// Rows in the batch.
        total: usize,
        /// Underlying warehouse error.
        #[source]
        source: WarehouseError,
    },

    /// A record could not be serialized to JSON text.
    #[error("failed to serialize record #{index}: {source}")]
    Serialize {
        /// Position of the record in the batch.
        index: usize,
        /// Serializer error.
        #[source]
        source: serde_json::Error,
    },

    /// File sink IO failure.
    #[error("IO error writing {}: {source}", path.display())]
    Io {
        /// Output path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the warehouse error kind, when this is a warehouse failure.
    #[must_use]
    pub fn warehouse_kind(&self) -> Option<WarehouseErrorKind> {
        match self {
            Self::Warehouse { source, .. } => Some(source.kind),
            Self::Serialize { .. } | Self::Io { .. } => None,
        }
    }
}
