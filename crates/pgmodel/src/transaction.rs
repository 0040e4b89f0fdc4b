//! Transaction management over a [`ConnectionPool`].
//!
//! [`Database`] runs statements in autocommit mode (acquire, execute, release)
//! and opens transactions. A [`Transaction`] exclusively owns one pooled
//! connection and moves through `Idle → Active → {Committed, RolledBack}`.
//! Leaving `Active` hands the connection back exactly once; since the
//! connection is moved out of the handle there is nothing left to release
//! twice.
//!
//! # Example
//!
//! ```ignore
//! use pgmodel::{Database, PgPool, DbConfig, Values};
//!
//! let db = Database::new(PgPool::connect(&DbConfig::from_env()?).await?);
//! let todo: Todo = db
//!     .transaction(async |tx| {
//!         let todo = todos.insert(tx, Values::new().set("title", "Buy milk")).await?;
//!         audit.insert(tx, Values::new().set("todo_id", todo.id)).await?;
//!         Ok(todo)
//!     })
//!     .await?;
//! ```

use crate::bind::ParamList;
use crate::error::{OrmError, OrmResult};
use crate::executor::{self, ConnGuard, Connection, ConnectionPool, Executor};
use crate::log::SqlLog;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_postgres::Row;

const TX_TARGET: &str = "pgmodel.tx";

/// Global counter for savepoint naming.
static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("pgmodel_sp_{n}")
}

/// Lifecycle of a [`Transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Connection held, BEGIN not yet acknowledged.
    Idle,
    Active,
    Committed,
    RolledBack,
}

/// Transaction isolation levels supported by PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionIsolation {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl TransactionIsolation {
    fn as_sql(self) -> &'static str {
        match self {
            TransactionIsolation::ReadUncommitted => "READ UNCOMMITTED",
            TransactionIsolation::ReadCommitted => "READ COMMITTED",
            TransactionIsolation::RepeatableRead => "REPEATABLE READ",
            TransactionIsolation::Serializable => "SERIALIZABLE",
        }
    }
}

/// Options rendered into the BEGIN statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    isolation_level: Option<TransactionIsolation>,
    read_only: Option<bool>,
    deferrable: Option<bool>,
}

impl TransactionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn isolation_level(mut self, level: TransactionIsolation) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn deferrable(mut self, deferrable: bool) -> Self {
        self.deferrable = Some(deferrable);
        self
    }

    /// The BEGIN statement for these options.
    pub fn begin_sql(&self) -> String {
        let mut modes = Vec::new();
        if let Some(level) = self.isolation_level {
            modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        if let Some(read_only) = self.read_only {
            modes.push(if read_only { "READ ONLY" } else { "READ WRITE" }.to_string());
        }
        if let Some(deferrable) = self.deferrable {
            modes.push(if deferrable { "DEFERRABLE" } else { "NOT DEFERRABLE" }.to_string());
        }
        if modes.is_empty() {
            "BEGIN".to_string()
        } else {
            format!("BEGIN {}", modes.join(", "))
        }
    }
}

/// Entry point for running statements: autocommit, or inside a transaction.
#[derive(Debug, Clone)]
pub struct Database<P> {
    pool: P,
    log: SqlLog,
}

impl<P: ConnectionPool> Database<P> {
    pub fn new(pool: P) -> Self {
        Self {
            pool,
            log: SqlLog::default(),
        }
    }

    /// Replace the SQL logging settings.
    pub fn with_sql_log(mut self, log: SqlLog) -> Self {
        self.log = log;
        self
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    /// Acquire a connection and issue BEGIN.
    pub async fn begin(&self) -> OrmResult<Transaction<P::Conn>> {
        self.begin_with(TransactionOptions::default()).await
    }

    /// Acquire a connection and issue BEGIN with options.
    pub async fn begin_with(&self, options: TransactionOptions) -> OrmResult<Transaction<P::Conn>> {
        let conn = self.pool.acquire().await?;
        let tx = Transaction::new(conn, self.log.clone());
        tx.start(&options.begin_sql()).await?;
        Ok(tx)
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok`. On `Err` the transaction is rolled back
    /// and the original error is returned; a failing ROLLBACK is logged, never
    /// substituted for it.
    pub async fn transaction<R, F>(&self, f: F) -> OrmResult<R>
    where
        F: AsyncFnOnce(&Transaction<P::Conn>) -> OrmResult<R>,
    {
        self.transaction_with(TransactionOptions::default(), f).await
    }

    /// [`transaction`](Self::transaction) with BEGIN options.
    pub async fn transaction_with<R, F>(&self, options: TransactionOptions, f: F) -> OrmResult<R>
    where
        F: AsyncFnOnce(&Transaction<P::Conn>) -> OrmResult<R>,
    {
        let tx = self.begin_with(options).await?;
        match f(&tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(
                        target: TX_TARGET,
                        error = %rollback_err,
                        "rollback failed after transaction error: {error}"
                    );
                }
                Err(error)
            }
        }
    }
}

impl<P: ConnectionPool> Executor for Database<P> {
    /// Autocommit: acquire, execute, release.
    async fn fetch(&self, sql: &str, params: &ParamList) -> OrmResult<Vec<Row>> {
        let mut guard = ConnGuard::new(self.pool.acquire().await?);
        let result = executor::run(guard.conn(), &self.log, sql, params).await;
        guard.release();
        result
    }
}

struct Inner<C> {
    conn: Option<C>,
    state: TransactionState,
}

/// A transaction that exclusively owns one pooled connection.
///
/// Dropping a handle that is still `Active` discards its connection, so the
/// server rolls the work back and the pool slot frees up.
pub struct Transaction<C: Connection> {
    inner: Mutex<Inner<C>>,
    log: SqlLog,
}

impl<C: Connection> std::fmt::Debug for Transaction<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self
            .inner
            .try_lock()
            .map(|inner| format!("{:?}", inner.state))
            .unwrap_or_else(|_| "<busy>".to_string());
        f.debug_struct("Transaction").field("state", &state).finish()
    }
}

impl<C: Connection> Transaction<C> {
    fn new(conn: C, log: SqlLog) -> Self {
        Self {
            inner: Mutex::new(Inner {
                conn: Some(conn),
                state: TransactionState::Idle,
            }),
            log,
        }
    }

    async fn start(&self, begin_sql: &str) -> OrmResult<()> {
        let mut inner = self.inner.lock().await;
        let Some(conn) = inner.conn.take() else {
            return Err(OrmError::TransactionState(inner.state));
        };
        let mut guard = ConnGuard::new(conn);
        match guard.conn().batch_execute(begin_sql).await {
            Ok(()) => {
                inner.conn = guard.into_inner();
                inner.state = TransactionState::Active;
                tracing::debug!(target: TX_TARGET, sql = begin_sql, "transaction started");
                Ok(())
            }
            Err(e) => {
                guard.discard();
                tracing::error!(target: TX_TARGET, error = %e, "BEGIN failed");
                Err(e)
            }
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> TransactionState {
        self.inner.lock().await.state
    }

    /// Commit and release the connection. A no-op unless `Active`.
    pub async fn commit(&self) -> OrmResult<()> {
        self.finish("COMMIT", TransactionState::Committed).await
    }

    /// Roll back and release the connection. A no-op unless `Active`.
    pub async fn rollback(&self) -> OrmResult<()> {
        self.finish("ROLLBACK", TransactionState::RolledBack).await
    }

    async fn finish(&self, sql: &str, target: TransactionState) -> OrmResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != TransactionState::Active {
            tracing::debug!(target: TX_TARGET, state = ?inner.state, "{sql} ignored");
            return Ok(());
        }
        let Some(conn) = inner.conn.take() else {
            return Err(OrmError::TransactionState(inner.state));
        };
        inner.state = target;

        let mut guard = ConnGuard::new(conn);
        match guard.conn().batch_execute(sql).await {
            Ok(()) => {
                guard.release();
                tracing::debug!(target: TX_TARGET, "{sql}");
                Ok(())
            }
            Err(e) => {
                // A failed COMMIT ends the transaction on the server as well.
                inner.state = TransactionState::RolledBack;
                guard.discard();
                tracing::error!(target: TX_TARGET, error = %e, "{sql} failed");
                Err(e)
            }
        }
    }

    /// Run `f` in a savepoint nested in this transaction.
    ///
    /// `Ok` releases the savepoint; `Err` rolls back to it and returns the
    /// error, leaving the outer transaction usable.
    pub async fn transaction<R, F>(&self, f: F) -> OrmResult<R>
    where
        F: AsyncFnOnce(&Transaction<C>) -> OrmResult<R>,
    {
        let name = next_savepoint_name();
        self.batch(&format!("SAVEPOINT {name}")).await?;
        tracing::debug!(target: TX_TARGET, savepoint = %name, "savepoint created");

        match f(self).await {
            Ok(value) => {
                self.batch(&format!("RELEASE SAVEPOINT {name}")).await?;
                Ok(value)
            }
            Err(error) => {
                let rollback = format!("ROLLBACK TO SAVEPOINT {name}");
                if let Err(rollback_err) = self.batch(&rollback).await {
                    tracing::error!(
                        target: TX_TARGET,
                        savepoint = %name,
                        error = %rollback_err,
                        "rollback to savepoint failed: {error}"
                    );
                }
                Err(error)
            }
        }
    }

    async fn batch(&self, sql: &str) -> OrmResult<()> {
        let mut inner = self.inner.lock().await;
        let state = inner.state;
        match (state, inner.conn.as_mut()) {
            (TransactionState::Active, Some(conn)) => conn.batch_execute(sql).await,
            _ => Err(OrmError::TransactionState(state)),
        }
    }
}

impl<C: Connection> Executor for Transaction<C> {
    async fn fetch(&self, sql: &str, params: &ParamList) -> OrmResult<Vec<Row>> {
        let mut inner = self.inner.lock().await;
        let state = inner.state;
        match (state, inner.conn.as_mut()) {
            (TransactionState::Active, Some(conn)) => {
                executor::run(conn, &self.log, sql, params).await
            }
            _ => Err(OrmError::TransactionState(state)),
        }
    }
}

impl<C: Connection> Drop for Transaction<C> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(conn) = inner.conn.take() {
            tracing::warn!(
                target: TX_TARGET,
                state = ?inner.state,
                "transaction dropped without commit or rollback; discarding connection"
            );
            conn.discard();
        }
    }
}
