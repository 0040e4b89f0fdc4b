//! In-memory connection pool for exercising transaction and autocommit paths
//! without a database.

#![allow(dead_code)]

use pgmodel::{Connection, ConnectionPool, FromRow, OrmError, OrmResult, Row, RowExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_postgres::types::ToSql;

#[derive(Debug)]
pub struct Todo {
    pub id: i64,
    pub title: String,
}

impl FromRow for Todo {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            title: row.try_get_column("title")?,
        })
    }
}

#[derive(Default)]
struct Shared {
    available: AtomicUsize,
    discarded: AtomicUsize,
    statements: Mutex<Vec<String>>,
    fail_on: Mutex<Option<String>>,
}

/// A pool of `capacity` fake connections that records every statement.
///
/// Queries return no rows. A statement containing the configured
/// `fail_on` substring fails with an execution error.
#[derive(Clone)]
pub struct MockPool {
    shared: Arc<Shared>,
}

impl MockPool {
    pub fn new(capacity: usize) -> Self {
        let shared = Shared {
            available: AtomicUsize::new(capacity),
            ..Shared::default()
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn fail_on(self, needle: &str) -> Self {
        *self.shared.fail_on.lock().unwrap() = Some(needle.to_string());
        self
    }

    pub fn available(&self) -> usize {
        self.shared.available.load(Ordering::SeqCst)
    }

    pub fn discarded(&self) -> usize {
        self.shared.discarded.load(Ordering::SeqCst)
    }

    pub fn statements(&self) -> Vec<String> {
        self.shared.statements.lock().unwrap().clone()
    }
}

impl ConnectionPool for MockPool {
    type Conn = MockConn;

    async fn acquire(&self) -> OrmResult<MockConn> {
        let taken = self
            .shared
            .available
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match taken {
            Ok(_) => Ok(MockConn {
                shared: Arc::clone(&self.shared),
            }),
            Err(_) => Err(OrmError::acquisition("pool exhausted")),
        }
    }
}

pub struct MockConn {
    shared: Arc<Shared>,
}

impl MockConn {
    fn record(&self, sql: &str) -> OrmResult<()> {
        self.shared.statements.lock().unwrap().push(sql.to_string());
        let fail_on = self.shared.fail_on.lock().unwrap().clone();
        match fail_on {
            Some(needle) if sql.contains(&needle) => Err(OrmError::execution(
                sql,
                std::io::Error::other(format!("mock failure on `{needle}`")),
            )),
            _ => Ok(()),
        }
    }
}

impl Connection for MockConn {
    async fn query(&mut self, sql: &str, _params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        self.record(sql)?;
        Ok(Vec::new())
    }

    async fn batch_execute(&mut self, sql: &str) -> OrmResult<()> {
        self.record(sql)
    }

    fn discard(self) {
        self.shared.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockConn {
    fn drop(&mut self) {
        self.shared.available.fetch_add(1, Ordering::SeqCst);
    }
}
