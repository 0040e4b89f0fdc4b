//! `tracing` output for executed statements and transaction transitions.
//!
//! Events use three targets so they can be filtered independently:
//! `pgmodel.sql`, `pgmodel.tx` and `pgmodel.pool`.

use std::time::Duration;
use tracing::Level;

pub(crate) const SQL_TARGET: &str = "pgmodel.sql";

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// Controls how executed SQL is reported.
///
/// Attach one with [`Database::with_sql_log`](crate::Database::with_sql_log).
#[derive(Debug, Clone)]
pub struct SqlLog {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes, on a char boundary). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for SqlLog {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl SqlLog {
    /// Create a logger with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }

    /// Report a statement that ran to completion.
    pub(crate) fn executed(&self, sql: &str, param_count: usize, rows: usize, elapsed: Duration) {
        let sql = self.truncate_sql(sql);
        emit_at_level!(
            self.level,
            target: SQL_TARGET,
            param_count,
            rows,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            sql = %sql,
        );
    }

    /// Report a statement the driver rejected. Always logged at ERROR.
    pub(crate) fn failed(&self, sql: &str, param_count: usize, error: &dyn std::error::Error) {
        let sql = self.truncate_sql(sql);
        tracing::error!(
            target: SQL_TARGET,
            param_count,
            error = %error,
            sql = %sql,
            "statement failed"
        );
    }
}

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
