//! Error types for pgmodel

use crate::compile::StatementKind;
use crate::transaction::TransactionState;
use std::time::Duration;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Result type alias for pgmodel operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Caller mistakes detected while building or compiling a statement.
///
/// These never reach the database and are not worth retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// INSERT/UPDATE issued without any writable data
    #[error("{0} requires at least one writable column")]
    MissingData(StatementKind),

    /// Statement kind the compiler does not know how to build
    #[error("unsupported statement kind: {0}")]
    UnsupportedOperation(String),

    /// A raw fragment whose `?` count does not match its bindings
    #[error("`{fragment}` has {placeholders} placeholder(s) but {bindings} binding(s)")]
    PlaceholderMismatch {
        fragment: String,
        placeholders: usize,
        bindings: usize,
    },
}

/// Error types for database operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Builder misuse (missing data, unsupported statement, malformed clause)
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// Pool exhausted, unreachable, or the bounded wait elapsed
    #[error("Acquisition error: {message}")]
    Acquisition {
        message: String,
        timeout: Option<Duration>,
    },

    /// Driver-level failure while running a compiled statement
    #[error("Execution error: {source}")]
    Execution {
        sql: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Statement issued on a transaction handle that is no longer active
    #[error("Transaction is {0:?}; no further statements can run on it")]
    TransactionState(TransactionState),

    /// A statement that must return a row returned none
    #[error("Not found: {0}")]
    NotFound(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Wrap a driver error together with the statement that produced it.
    pub fn execution(
        sql: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Execution {
            sql: sql.into(),
            source: source.into(),
        }
    }

    /// Create an acquisition error
    pub fn acquisition(message: impl Into<String>) -> Self {
        Self::Acquisition {
            message: message.into(),
            timeout: None,
        }
    }

    /// Create an acquisition error for an elapsed bounded wait
    pub fn acquisition_timeout(timeout: Duration) -> Self {
        Self::Acquisition {
            message: format!("no connection available within {timeout:?}"),
            timeout: Some(timeout),
        }
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// The compiled SQL attached to an execution error.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Execution { sql, .. } => Some(sql),
            _ => None,
        }
    }

    /// SQLSTATE of the underlying Postgres error, if any.
    pub fn sqlstate(&self) -> Option<&SqlState> {
        match self {
            Self::Execution { source, .. } => source
                .downcast_ref::<tokio_postgres::Error>()
                .and_then(|e| e.code()),
            _ => None,
        }
    }

    /// Only acquisition failures are worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Acquisition { .. })
    }

    /// Check if this is a usage error
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage(_))
    }

    /// Check if this is an acquisition timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Acquisition {
                timeout: Some(_),
                ..
            }
        )
    }

    /// Check if this is a unique violation error
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate() == Some(&SqlState::UNIQUE_VIOLATION)
    }

    /// Check if this is a foreign key violation error
    pub fn is_foreign_key_violation(&self) -> bool {
        self.sqlstate() == Some(&SqlState::FOREIGN_KEY_VIOLATION)
    }

    /// Check if this is a check constraint violation error
    pub fn is_check_violation(&self) -> bool {
        self.sqlstate() == Some(&SqlState::CHECK_VIOLATION)
    }
}

impl From<deadpool_postgres::PoolError> for OrmError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::acquisition(err.to_string())
    }
}

impl From<toml::de::Error> for OrmError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
