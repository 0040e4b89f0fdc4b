//! # pgmodel
//!
//! Table-mapped query building and transactional execution for PostgreSQL.
//!
//! ## Features
//!
//! - **Consuming builder**: each chain starts from [`Model::query`]; its terminal call uses it up
//! - **Positional bindings**: typed parameter slots, numbered `$1..$n` once at compile time
//! - **Fillable columns**: INSERT / UPDATE data is filtered through a per-table whitelist
//! - **Typed rows**: Row → Struct via `FromRow`
//! - **Transactions**: call-scoped with commit on `Ok`, rollback on `Err`, savepoints when nested
//! - **Explicit pool**: deadpool-postgres with a bounded acquisition wait; no global state
//!
//! ## Example
//!
//! ```ignore
//! use pgmodel::{Database, DbConfig, FromRow, Model, PgPool, Values};
//!
//! #[derive(Debug, FromRow)]
//! struct Todo {
//!     id: i64,
//!     title: String,
//!     done: bool,
//! }
//!
//! let db = Database::new(PgPool::connect(&DbConfig::from_env()?).await?);
//! let todos = Model::new("todos").fillable(["title", "done"]);
//!
//! // INSERT
//! let todo: Todo = todos.insert(&db, Values::new().set("title", "Buy milk")).await?;
//!
//! // SELECT
//! let open: Vec<Todo> = todos.query().where_eq("done", false).get_all(&db).await?;
//!
//! // UPDATE inside a transaction
//! db.transaction(async |tx| {
//!     todos
//!         .query()
//!         .where_eq("id", todo.id)
//!         .update::<Todo>(tx, Values::new().set("done", true))
//!         .await?;
//!     Ok(())
//! })
//! .await?;
//! ```

pub mod bind;
pub mod clause;
pub mod compile;
pub mod config;
pub mod error;
pub mod executor;
pub mod fillable;
pub mod log;
pub mod model;
pub mod pagination;
pub mod pool;
pub mod prelude;
pub mod row;
pub mod transaction;

pub use bind::{Fragment, Param, ParamList, SqlWriter};
pub use clause::{Clause, ClauseKind, JoinKind, Op, Order};
pub use compile::{CompiledQuery, Compiler, QueryState, QueryWarning, StatementKind};
pub use config::DbConfig;
pub use error::{OrmError, OrmResult, UsageError};
pub use executor::{Connection, ConnectionPool, Executor};
pub use fillable::{Fillable, Values};
pub use log::SqlLog;
pub use model::{Model, Query};
pub use pagination::{Page, PageInfo};
pub use pool::{PgConnection, PgPool, create_pool_with_manager_config};
pub use row::{FromRow, Row, RowExt};
pub use transaction::{
    Database, Transaction, TransactionIsolation, TransactionOptions, TransactionState,
};

#[cfg(feature = "derive")]
pub use pgmodel_derive::FromRow;
