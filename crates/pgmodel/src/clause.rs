//! Typed WHERE / HAVING clauses and JOIN fragments.
//!
//! Each [`Clause`] owns exactly the bindings its fragment consumes. Nothing is
//! numbered here; `$n` indices are assigned when the compiler writes the
//! clause into a statement.

use crate::bind::{Fragment, Param};
use crate::error::UsageError;
use std::fmt;
use std::str::FromStr;

/// What kind of condition a clause is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    Basic,
    Raw,
    In,
    NotIn,
    Null,
    NotNull,
}

/// Comparison operator for [`Clause::basic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    ILike,
    NotLike,
    NotILike,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Like => "LIKE",
            Op::ILike => "ILIKE",
            Op::NotLike => "NOT LIKE",
            Op::NotILike => "NOT ILIKE",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Op {
    type Err = UsageError;

    /// Parses the SQL spelling, case-insensitively. `<>` is accepted as `!=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "=" => Ok(Op::Eq),
            "!=" | "<>" => Ok(Op::Ne),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Lte),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Gte),
            "LIKE" => Ok(Op::Like),
            "ILIKE" => Ok(Op::ILike),
            "NOT LIKE" => Ok(Op::NotLike),
            "NOT ILIKE" => Ok(Op::NotILike),
            _ => Err(UsageError::UnsupportedOperation(format!(
                "comparison operator `{s}`"
            ))),
        }
    }
}

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    pub fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A registered WHERE condition.
#[derive(Debug, Clone)]
pub struct Clause {
    kind: ClauseKind,
    fragment: Fragment,
}

impl Clause {
    /// `column op ?`
    pub fn basic(column: &str, op: Op, value: Param) -> Self {
        let mut fragment = Fragment::text(format!("{column} {} ", op.as_sql()));
        fragment.push_slot(value);
        Self {
            kind: ClauseKind::Basic,
            fragment,
        }
    }

    /// A trusted SQL template with `?` placeholders.
    pub fn raw(sql: &str, params: Vec<Param>) -> Result<Self, UsageError> {
        Ok(Self {
            kind: ClauseKind::Raw,
            fragment: Fragment::template(sql, params)?,
        })
    }

    /// `column IN (?, ?, ...)`. An empty list can never match, so it becomes `1 = 0`.
    pub fn in_list(column: &str, values: Vec<Param>) -> Self {
        if values.is_empty() {
            return Self {
                kind: ClauseKind::Raw,
                fragment: Fragment::text("1 = 0"),
            };
        }
        Self {
            kind: ClauseKind::In,
            fragment: list_fragment(column, "IN", values),
        }
    }

    /// `column NOT IN (?, ?, ...)`. Returns `None` for an empty list, which
    /// excludes nothing and is simply not registered.
    pub fn not_in(column: &str, values: Vec<Param>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            kind: ClauseKind::NotIn,
            fragment: list_fragment(column, "NOT IN", values),
        })
    }

    pub fn null(column: &str) -> Self {
        Self {
            kind: ClauseKind::Null,
            fragment: Fragment::text(format!("{column} IS NULL")),
        }
    }

    pub fn not_null(column: &str) -> Self {
        Self {
            kind: ClauseKind::NotNull,
            fragment: Fragment::text(format!("{column} IS NOT NULL")),
        }
    }

    pub fn kind(&self) -> ClauseKind {
        self.kind
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }
}

fn list_fragment(column: &str, keyword: &str, values: Vec<Param>) -> Fragment {
    let mut fragment = Fragment::text(format!("{column} {keyword} ("));
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            fragment.push_text(", ");
        }
        fragment.push_slot(value);
    }
    fragment.push_text(")");
    fragment
}

/// JOIN flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// Render `KIND JOIN table ON first op second`.
pub(crate) fn join_sql(kind: JoinKind, table: &str, first: &str, op: &str, second: &str) -> String {
    format!("{} {table} ON {first} {op} {second}", kind.as_sql())
}
