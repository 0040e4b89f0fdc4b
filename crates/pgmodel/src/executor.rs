//! Connection and executor traits.
//!
//! [`ConnectionPool`] / [`Connection`] are what the transaction manager needs
//! from a pool. [`PgPool`](crate::PgPool) implements them over deadpool; tests
//! can supply an in-memory pool instead.
//!
//! [`Executor`] is what terminal builder calls run against: either a
//! [`Database`](crate::Database) in autocommit mode or an active
//! [`Transaction`](crate::Transaction).

use crate::bind::ParamList;
use crate::error::OrmResult;
use crate::log::SqlLog;
use std::future::Future;
use std::time::Instant;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// One exclusively held pooled connection.
pub trait Connection: Send + 'static {
    /// Run a statement with `$n` bindings and return its rows.
    fn query(
        &mut self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Run one or more statements without bindings (BEGIN, COMMIT, SAVEPOINT, ...).
    fn batch_execute(&mut self, sql: &str) -> impl Future<Output = OrmResult<()>> + Send;

    /// Hand the connection back to its pool.
    fn release(self)
    where
        Self: Sized,
    {
        drop(self)
    }

    /// Give up on the connection so it is never reused.
    ///
    /// Used when a transaction is abandoned mid-flight: closing the session
    /// makes the server roll back and frees the pool slot.
    fn discard(self)
    where
        Self: Sized,
    {
        self.release()
    }
}

/// Source of pooled connections.
pub trait ConnectionPool: Send + Sync {
    type Conn: Connection;

    /// Wait (bounded) for a connection.
    fn acquire(&self) -> impl Future<Output = OrmResult<Self::Conn>> + Send;
}

/// Something terminal builder operations can run a compiled statement on.
pub trait Executor: Send + Sync {
    fn fetch(&self, sql: &str, params: &ParamList)
    -> impl Future<Output = OrmResult<Vec<Row>>> + Send;
}

impl<E: Executor> Executor for &E {
    fn fetch(
        &self,
        sql: &str,
        params: &ParamList,
    ) -> impl Future<Output = OrmResult<Vec<Row>>> + Send {
        (**self).fetch(sql, params)
    }
}

/// Run one statement on `conn`, logging the outcome.
pub(crate) async fn run<C: Connection>(
    conn: &mut C,
    log: &SqlLog,
    sql: &str,
    params: &ParamList,
) -> OrmResult<Vec<Row>> {
    let start = Instant::now();
    let refs = params.as_refs();
    match conn.query(sql, &refs).await {
        Ok(rows) => {
            log.executed(sql, params.len(), rows.len(), start.elapsed());
            Ok(rows)
        }
        Err(e) => {
            log.failed(sql, params.len(), &e);
            Err(e)
        }
    }
}

/// Holds a connection while work is in flight.
///
/// Unless explicitly released, the connection is discarded on drop. A future
/// cancelled mid-statement therefore never returns a connection in an unknown
/// state to the pool.
pub(crate) struct ConnGuard<C: Connection> {
    conn: Option<C>,
}

impl<C: Connection> ConnGuard<C> {
    pub(crate) fn new(conn: C) -> Self {
        Self { conn: Some(conn) }
    }

    pub(crate) fn conn(&mut self) -> &mut C {
        match self.conn.as_mut() {
            Some(conn) => conn,
            None => unreachable!("connection guard used after hand-off"),
        }
    }

    pub(crate) fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.release();
        }
    }

    pub(crate) fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.discard();
        }
    }

    /// Give up ownership without releasing.
    pub(crate) fn into_inner(mut self) -> Option<C> {
        self.conn.take()
    }
}

impl<C: Connection> Drop for ConnGuard<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.discard();
        }
    }
}
