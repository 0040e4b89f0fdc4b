//! Table mappings and the fluent query builder.
//!
//! A [`Model`] names a table, its fillable columns and its primary key. Each
//! call to [`Model::query`] starts a fresh [`Query`]; chained calls consume
//! and return it, and a terminal call (`first`, `get_all`, `update`, ...)
//! consumes it for good. No state carries over between chains.
//!
//! # Example
//!
//! ```ignore
//! use pgmodel::{Model, Order, Values};
//!
//! let todos = Model::new("todos").fillable(["title", "description", "done"]);
//!
//! let open: Vec<Todo> = todos
//!     .query()
//!     .where_eq("done", false)
//!     .where_in("priority", [1_i32, 2])
//!     .order_by("created_at", Order::Desc)
//!     .limit(20)
//!     .get_all(&db)
//!     .await?;
//!
//! let page = todos.query().where_eq("done", true).paginate::<Todo>(&db, 2, 10).await?;
//! ```

use crate::bind::{Fragment, Param, ParamList};
use crate::clause::{Clause, JoinKind, Op, Order, join_sql};
use crate::compile::{CompiledQuery, Compiler, QueryState, StatementKind};
use crate::error::{OrmError, OrmResult, UsageError};
use crate::executor::Executor;
use crate::fillable::{Fillable, Values};
use crate::pagination::{Page, PageInfo};
use crate::row::{FromRow, RowExt, map_rows};
use std::sync::Arc;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

#[derive(Debug, Clone)]
struct ModelInner {
    table: String,
    fillable: Fillable,
}

/// A table mapping. Cheap to clone; immutable once built.
#[derive(Debug, Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Map `table`. No fillable restriction; primary key `id`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                table: table.into(),
                fillable: Fillable::default(),
            }),
        }
    }

    /// Restrict INSERT / UPDATE data to these columns.
    pub fn fillable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let inner = Arc::make_mut(&mut self.inner);
        let primary_key = inner.fillable.primary_key_name().to_string();
        inner.fillable = Fillable::new(fields).primary_key(primary_key);
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        let inner = Arc::make_mut(&mut self.inner);
        inner.fillable = inner.fillable.clone().primary_key(column);
        self
    }

    pub fn table(&self) -> &str {
        &self.inner.table
    }

    pub fn fillable_spec(&self) -> &Fillable {
        &self.inner.fillable
    }

    /// Start a new query chain.
    pub fn query(&self) -> Query {
        Query {
            model: self.clone(),
            state: QueryState::default(),
        }
    }

    /// Fetch by primary key.
    pub async fn find<T, V>(&self, exec: &impl Executor, id: V) -> OrmResult<Option<T>>
    where
        T: FromRow,
        V: ToSql + Send + Sync + 'static,
    {
        let pk = self.inner.fillable.primary_key_name().to_string();
        self.query().where_eq(&pk, id).first(exec).await
    }

    /// Every row where `column op value`.
    pub async fn find_by<T, V>(
        &self,
        exec: &impl Executor,
        column: &str,
        op: Op,
        value: V,
    ) -> OrmResult<Vec<T>>
    where
        T: FromRow,
        V: ToSql + Send + Sync + 'static,
    {
        self.query().where_op(column, op, value).get_all(exec).await
    }

    /// Fetch every row of the table.
    pub async fn all<T: FromRow>(&self, exec: &impl Executor) -> OrmResult<Vec<T>> {
        self.query().get_all(exec).await
    }

    /// Insert one row and return it.
    pub async fn insert<T: FromRow>(&self, exec: &impl Executor, data: Values) -> OrmResult<T> {
        self.query().insert(exec, data).await
    }

    /// `TRUNCATE TABLE`, optionally cascading to referencing tables.
    pub async fn truncate(&self, exec: &impl Executor, cascade: bool) -> OrmResult<()> {
        let mut sql = format!("TRUNCATE TABLE {}", self.inner.table);
        if cascade {
            sql.push_str(" CASCADE");
        }
        exec.fetch(&sql, &ParamList::new()).await?;
        Ok(())
    }

    /// Run trusted SQL as written. Placeholders must already be `$1..$n`.
    pub async fn raw(
        &self,
        exec: &impl Executor,
        sql: &str,
        params: Vec<Param>,
    ) -> OrmResult<Vec<Row>> {
        let params: ParamList = params.into_iter().collect();
        exec.fetch(sql, &params).await
    }

    /// [`raw`](Self::raw), mapping each row to `T`.
    pub async fn select_raw<T: FromRow>(
        &self,
        exec: &impl Executor,
        sql: &str,
        params: Vec<Param>,
    ) -> OrmResult<Vec<T>> {
        let rows = self.raw(exec, sql, params).await?;
        map_rows(&rows)
    }
}

/// One chain of builder calls against a [`Model`].
#[derive(Debug, Clone)]
pub struct Query {
    model: Model,
    state: QueryState,
}

impl Query {
    // ==================== Columns ====================

    /// Select these columns. An empty list selects `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        self.state.columns = if columns.is_empty() {
            vec!["*".to_string()]
        } else {
            columns
        };
        self
    }

    // ==================== WHERE ====================

    /// `column = value`
    pub fn where_eq<T: ToSql + Send + Sync + 'static>(self, column: &str, value: T) -> Self {
        self.where_op(column, Op::Eq, value)
    }

    /// `column op value`
    pub fn where_op<T>(mut self, column: &str, op: Op, value: T) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.state
            .wheres
            .push(Clause::basic(column, op, Param::new(value)));
        self
    }

    /// A trusted condition with `?` placeholders, one per entry in `params`.
    ///
    /// A count mismatch is reported when the query is compiled.
    pub fn where_raw(mut self, sql: &str, params: Vec<Param>) -> Self {
        match Clause::raw(sql, params) {
            Ok(clause) => self.state.wheres.push(clause),
            Err(e) => self.state.record_error(e),
        }
        self
    }

    /// `column IN (...)`. An empty list matches no rows.
    pub fn where_in<I, T>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToSql + Send + Sync + 'static,
    {
        let values = values.into_iter().map(Param::new).collect();
        self.state.wheres.push(Clause::in_list(column, values));
        self
    }

    /// `column NOT IN (...)`. An empty list adds no condition.
    pub fn where_not_in<I, T>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToSql + Send + Sync + 'static,
    {
        let values = values.into_iter().map(Param::new).collect();
        if let Some(clause) = Clause::not_in(column, values) {
            self.state.wheres.push(clause);
        }
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        self.state.wheres.push(Clause::null(column));
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        self.state.wheres.push(Clause::not_null(column));
        self
    }

    // ==================== JOIN ====================

    pub fn inner_join(self, table: &str, first: &str, op: &str, second: &str) -> Self {
        self.join(JoinKind::Inner, table, first, op, second)
    }

    pub fn left_join(self, table: &str, first: &str, op: &str, second: &str) -> Self {
        self.join(JoinKind::Left, table, first, op, second)
    }

    pub fn right_join(self, table: &str, first: &str, op: &str, second: &str) -> Self {
        self.join(JoinKind::Right, table, first, op, second)
    }

    /// Append a JOIN clause verbatim.
    pub fn join_raw(mut self, sql: impl Into<String>) -> Self {
        self.state.joins.push(sql.into());
        self
    }

    fn join(mut self, kind: JoinKind, table: &str, first: &str, op: &str, second: &str) -> Self {
        self.state.joins.push(join_sql(kind, table, first, op, second));
        self
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .group_by
            .extend(columns.into_iter().map(Into::into));
        self
    }

    /// Set the HAVING condition, replacing any earlier one.
    pub fn having(mut self, sql: &str, params: Vec<Param>) -> Self {
        match Fragment::template(sql, params) {
            Ok(fragment) => self.state.having = Some(fragment),
            Err(e) => self.state.record_error(e),
        }
        self
    }

    // ==================== ORDER / LIMIT / OFFSET ====================

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.state
            .order_by
            .push(format!("{column} {}", order.as_sql()));
        self
    }

    pub fn order_by_asc(self, column: &str) -> Self {
        self.order_by(column, Order::Asc)
    }

    pub fn order_by_desc(self, column: &str) -> Self {
        self.order_by(column, Order::Desc)
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.state.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.state.offset = Some(offset);
        self
    }

    // ==================== Compilation ====================

    /// Compile without executing.
    pub fn compile(
        &self,
        kind: StatementKind,
        data: Option<&Values>,
    ) -> Result<CompiledQuery, UsageError> {
        let model = &self.model.inner;
        Compiler::new(&model.table, &model.fillable).compile(&self.state, kind, data)
    }

    /// The SELECT this chain would run.
    pub fn to_sql(&self) -> Result<CompiledQuery, UsageError> {
        self.compile(StatementKind::Select, None)
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    // ==================== Terminal operations ====================

    /// First matching row (adds `LIMIT 1`).
    pub async fn first<T: FromRow>(self, exec: &impl Executor) -> OrmResult<Option<T>> {
        let compiled = self.limit(1).to_sql()?;
        let rows = fetch(exec, &compiled).await?;
        rows.first().map(T::from_row).transpose()
    }

    /// Every matching row.
    pub async fn get_all<T: FromRow>(self, exec: &impl Executor) -> OrmResult<Vec<T>> {
        let compiled = self.to_sql()?;
        let rows = fetch(exec, &compiled).await?;
        map_rows(&rows)
    }

    /// Insert `data` (filtered to fillable columns) and return the new row.
    pub async fn insert<T: FromRow>(self, exec: &impl Executor, data: Values) -> OrmResult<T> {
        let compiled = self.compile(StatementKind::Insert, Some(&data))?;
        let rows = fetch(exec, &compiled).await?;
        match rows.first() {
            Some(row) => T::from_row(row),
            None => Err(OrmError::not_found(format!(
                "INSERT INTO {} returned no row",
                self.model.table()
            ))),
        }
    }

    /// Update matching rows with `data` and return them. No WHERE updates every row.
    pub async fn update<T: FromRow>(self, exec: &impl Executor, data: Values) -> OrmResult<Vec<T>> {
        let compiled = self.compile(StatementKind::Update, Some(&data))?;
        let rows = fetch(exec, &compiled).await?;
        map_rows(&rows)
    }

    /// Delete matching rows and return them. No WHERE deletes every row.
    pub async fn delete<T: FromRow>(self, exec: &impl Executor) -> OrmResult<Vec<T>> {
        let compiled = self.compile(StatementKind::Delete, None)?;
        let rows = fetch(exec, &compiled).await?;
        map_rows(&rows)
    }

    /// `COUNT(*)` over the current filter.
    pub async fn count(self, exec: &impl Executor) -> OrmResult<i64> {
        self.count_by(exec, "*").await
    }

    /// `COUNT(expr)` over the current filter. ORDER BY / LIMIT / OFFSET are ignored.
    ///
    /// A chain with GROUP BY or HAVING counts its groups instead, and `expr`
    /// is not used.
    pub async fn count_by(self, exec: &impl Executor, expr: &str) -> OrmResult<i64> {
        let mut state = self.state.for_count();
        state.columns = vec![expr.to_string()];
        let model = &self.model.inner;
        let compiled = Compiler::new(&model.table, &model.fillable).compile(
            &state,
            StatementKind::Count,
            None,
        )?;
        let rows = fetch(exec, &compiled).await?;
        match rows.first() {
            Some(row) => row.try_get_column::<i64>("total"),
            None => Ok(0),
        }
    }

    /// Whether any row matches.
    pub async fn exists(self, exec: &impl Executor) -> OrmResult<bool> {
        let compiled = self.select(["1"]).limit(1).to_sql()?;
        let rows = fetch(exec, &compiled).await?;
        Ok(!rows.is_empty())
    }

    /// One page of matching rows plus totals.
    ///
    /// The total comes from a COUNT over a copy of this chain with ORDER BY,
    /// LIMIT and OFFSET stripped; the rows from the chain itself with
    /// `LIMIT per_page OFFSET (page - 1) * per_page`.
    pub async fn paginate<T: FromRow>(
        self,
        exec: &impl Executor,
        page: u64,
        per_page: u64,
    ) -> OrmResult<Page<T>> {
        let total = self.clone().count(exec).await?;
        let info = PageInfo::new(u64::try_from(total).unwrap_or(0), page, per_page);
        let rows = self
            .limit(info.per_page)
            .offset(info.offset())
            .get_all(exec)
            .await?;
        Ok(Page { rows, info })
    }
}

async fn fetch(exec: &impl Executor, compiled: &CompiledQuery) -> OrmResult<Vec<Row>> {
    exec.fetch(compiled.sql(), compiled.params()).await
}
