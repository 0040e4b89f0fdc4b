//! Query compilation: `QueryState` + statement kind → SQL text and bindings.
//!
//! Clause order is fixed per statement:
//!
//! - SELECT: columns, FROM, JOIN, WHERE, GROUP BY, HAVING, ORDER BY, LIMIT, OFFSET
//! - COUNT: `SELECT COUNT(expr) AS total`, then SELECT's clauses up to HAVING
//! - INSERT: filtered columns and values, `RETURNING *`
//! - UPDATE: SET from filtered data, WHERE, `RETURNING *`
//! - DELETE: WHERE, `RETURNING *`
//!
//! Everything here is pure. A compile either yields a whole statement or a
//! [`UsageError`]; no partial SQL escapes.

use crate::bind::{Fragment, ParamList, SqlWriter};
use crate::clause::Clause;
use crate::error::UsageError;
use crate::fillable::{Fillable, Values};
use crate::log::SQL_TARGET;
use std::fmt;
use std::str::FromStr;

/// The statement shapes the compiler can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Count,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Count => "COUNT",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatementKind {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SELECT" => Ok(StatementKind::Select),
            "INSERT" => Ok(StatementKind::Insert),
            "UPDATE" => Ok(StatementKind::Update),
            "DELETE" => Ok(StatementKind::Delete),
            "COUNT" => Ok(StatementKind::Count),
            _ => Err(UsageError::UnsupportedOperation(s.to_string())),
        }
    }
}

/// Non-fatal finding attached to a compiled statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryWarning {
    /// UPDATE with no WHERE clause touches every row.
    UnguardedUpdate,
    /// DELETE with no WHERE clause removes every row.
    UnguardedDelete,
}

impl fmt::Display for QueryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryWarning::UnguardedUpdate => f.write_str("UPDATE without WHERE updates all rows"),
            QueryWarning::UnguardedDelete => f.write_str("DELETE without WHERE deletes all rows"),
        }
    }
}

/// A finished statement: SQL with `$n` placeholders and the matching bindings.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    sql: String,
    params: ParamList,
    kind: StatementKind,
    warning: Option<QueryWarning>,
}

impl CompiledQuery {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn warning(&self) -> Option<QueryWarning> {
        self.warning
    }

    pub fn into_parts(self) -> (String, ParamList) {
        (self.sql, self.params)
    }
}

/// Everything a chain of builder calls has accumulated.
#[derive(Debug, Clone)]
pub struct QueryState {
    pub(crate) columns: Vec<String>,
    pub(crate) wheres: Vec<Clause>,
    pub(crate) joins: Vec<String>,
    pub(crate) group_by: Vec<String>,
    pub(crate) having: Option<Fragment>,
    pub(crate) order_by: Vec<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    /// First builder misuse; reported when the statement is compiled.
    pub(crate) error: Option<UsageError>,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            columns: vec!["*".to_string()],
            wheres: Vec::new(),
            joins: Vec::new(),
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            error: None,
        }
    }
}

impl QueryState {
    /// Remember a usage error; the first one wins.
    pub(crate) fn record_error(&mut self, err: UsageError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// The same filter with ORDER BY / LIMIT / OFFSET stripped, for totals.
    pub(crate) fn for_count(&self) -> Self {
        Self {
            order_by: Vec::new(),
            limit: None,
            offset: None,
            ..self.clone()
        }
    }

    pub fn has_where(&self) -> bool {
        !self.wheres.is_empty()
    }

    pub fn where_count(&self) -> usize {
        self.wheres.len()
    }

    fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || self.having.is_some()
    }
}

/// Compiles statements for one table.
#[derive(Debug, Clone, Copy)]
pub struct Compiler<'a> {
    table: &'a str,
    fillable: &'a Fillable,
}

impl<'a> Compiler<'a> {
    pub fn new(table: &'a str, fillable: &'a Fillable) -> Self {
        Self { table, fillable }
    }

    /// Compile `state` into a statement of `kind`.
    ///
    /// `data` is required for INSERT and UPDATE and ignored otherwise.
    pub fn compile(
        &self,
        state: &QueryState,
        kind: StatementKind,
        data: Option<&Values>,
    ) -> Result<CompiledQuery, UsageError> {
        if let Some(err) = &state.error {
            return Err(err.clone());
        }

        let mut w = SqlWriter::new();
        let mut warning = None;

        match kind {
            StatementKind::Select => {
                w.push("SELECT ");
                w.push(&state.columns.join(", "));
                self.push_from_through_having(&mut w, state);
                push_order_limit_offset(&mut w, state);
            }
            StatementKind::Count => {
                let expr = state.columns.first().map(String::as_str).unwrap_or("*");
                if state.is_grouped() {
                    w.push("SELECT COUNT(*) AS total FROM (SELECT 1");
                    self.push_from_through_having(&mut w, state);
                    w.push(") AS grouped");
                } else {
                    w.push("SELECT COUNT(");
                    w.push(expr);
                    w.push(") AS total");
                    self.push_from_through_having(&mut w, state);
                }
            }
            StatementKind::Insert => {
                let values = self.fillable.for_insert(require_data(kind, data)?);
                if values.is_empty() {
                    return Err(UsageError::MissingData(kind));
                }
                w.push("INSERT INTO ");
                w.push(self.table);
                w.push(" (");
                w.push(&values.columns().collect::<Vec<_>>().join(", "));
                w.push(") VALUES (");
                for (i, (_, param)) in values.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.push_param(param.clone());
                }
                w.push(") RETURNING *");
            }
            StatementKind::Update => {
                let values = self.fillable.for_update(require_data(kind, data)?);
                if values.is_empty() {
                    return Err(UsageError::MissingData(kind));
                }
                w.push("UPDATE ");
                w.push(self.table);
                w.push(" SET ");
                for (i, (column, param)) in values.iter().enumerate() {
                    if i > 0 {
                        w.push(", ");
                    }
                    w.push(column);
                    w.push(" = ");
                    w.push_param(param.clone());
                }
                push_where(&mut w, state);
                w.push(" RETURNING *");
                if !state.has_where() {
                    warning = Some(QueryWarning::UnguardedUpdate);
                }
            }
            StatementKind::Delete => {
                w.push("DELETE FROM ");
                w.push(self.table);
                push_where(&mut w, state);
                w.push(" RETURNING *");
                if !state.has_where() {
                    warning = Some(QueryWarning::UnguardedDelete);
                }
            }
        }

        if let Some(warning) = warning {
            tracing::warn!(target: SQL_TARGET, table = self.table, "{warning}");
        }

        let (sql, params) = w.finish();
        Ok(CompiledQuery {
            sql,
            params,
            kind,
            warning,
        })
    }

    fn push_from_through_having(&self, w: &mut SqlWriter, state: &QueryState) {
        w.push(" FROM ");
        w.push(self.table);
        for join in &state.joins {
            w.push(" ");
            w.push(join);
        }
        push_where(w, state);
        if !state.group_by.is_empty() {
            w.push(" GROUP BY ");
            w.push(&state.group_by.join(", "));
        }
        if let Some(having) = &state.having {
            w.push(" HAVING ");
            w.push_fragment(having);
        }
    }
}

fn require_data(kind: StatementKind, data: Option<&Values>) -> Result<&Values, UsageError> {
    data.ok_or(UsageError::MissingData(kind))
}

/// ` WHERE (a) AND (b)`; nothing when no clause is registered.
fn push_where(w: &mut SqlWriter, state: &QueryState) {
    for (i, clause) in state.wheres.iter().enumerate() {
        w.push(if i == 0 { " WHERE (" } else { " AND (" });
        w.push_fragment(clause.fragment());
        w.push(")");
    }
}

const BIGINT_MAX: u64 = i64::MAX as u64;

fn push_order_limit_offset(w: &mut SqlWriter, state: &QueryState) {
    if !state.order_by.is_empty() {
        w.push(" ORDER BY ");
        w.push(&state.order_by.join(", "));
    }
    // Postgres takes LIMIT / OFFSET as bigint.
    if let Some(limit) = state.limit {
        w.push(&format!(" LIMIT {}", limit.min(BIGINT_MAX)));
    }
    if let Some(offset) = state.offset {
        w.push(&format!(" OFFSET {}", offset.min(BIGINT_MAX)));
    }
}
