//! Convenient imports for typical `pgmodel` usage.
//!
//! ```ignore
//! use pgmodel::prelude::*;
//! ```

pub use crate::{
    Database, DbConfig, Executor, FromRow, Model, Op, Order, OrmError, OrmResult, Page, PgPool,
    Query, RowExt, Values, params,
};
