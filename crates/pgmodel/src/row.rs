//! Row mapping traits

use crate::error::{OrmError, OrmResult};
pub use tokio_postgres::Row;

/// Explicit mapping from a result row to a typed record.
///
/// Implement by hand, or derive it:
///
/// ```ignore
/// use pgmodel::FromRow;
///
/// #[derive(FromRow)]
/// struct Todo {
///     id: i64,
///     title: String,
///     #[orm(column = "is_done")]
///     completed: bool,
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> OrmResult<Self>;
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning OrmError::Decode on failure
    fn try_get_column<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> OrmResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| OrmError::decode(column, e.to_string()))
    }
}

/// Map every row, stopping at the first decode failure.
pub(crate) fn map_rows<T: FromRow>(rows: &[Row]) -> OrmResult<Vec<T>> {
    rows.iter().map(T::from_row).collect()
}
