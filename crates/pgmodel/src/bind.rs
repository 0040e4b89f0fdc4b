//! Binding translation: parameter slots rendered as `$n` placeholders.
//!
//! Clause text is never rewritten after the fact. Every clause is stored as a
//! [`Fragment`] (text pieces interleaved with typed parameter slots), and the
//! compiler streams fragments into a single [`SqlWriter`]. The writer owns the
//! only placeholder counter for the whole statement, so `$n` numbering stays
//! positional across WHERE, HAVING and value lists no matter which clause
//! contributed the binding.

use crate::error::UsageError;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// One bound value.
///
/// `Query` chains are cloned for the COUNT pass of `paginate`, so values sit
/// behind an `Arc` and a clone never copies the payload.
#[derive(Clone)]
pub struct Param(Arc<dyn ToSql + Send + Sync>);

impl Param {
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Param(Arc::new(value))
    }

    fn value(&self) -> &(dyn ToSql + Sync) {
        &*self.0
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&*self.0, f)
    }
}

/// Build a `Vec<Param>` for a `?` template.
///
/// ```ignore
/// let q = todos.query().where_raw(
///     "owner_id = ? AND title ILIKE ?",
///     pgmodel::params![7_i64, "%milk%"],
/// );
/// ```
#[macro_export]
macro_rules! params {
    () => { ::std::vec::Vec::<$crate::Param>::new() };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Param::new($value)),+]
    };
}

/// Bindings of one compiled statement; entry `i` is `$i+1`.
#[derive(Clone, Debug, Default)]
pub struct ParamList(Vec<Param>);

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `param`; returns the placeholder number it binds to.
    pub fn push_param(&mut self, param: Param) -> usize {
        self.0.push(param);
        self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrowed in the shape `tokio_postgres::Client::query` expects.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.0.iter().map(Param::value).collect()
    }
}

impl FromIterator<Param> for ParamList {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One piece of a [`Fragment`].
#[derive(Clone, Debug)]
pub enum Piece {
    /// Literal SQL text
    Text(String),
    /// A parameter slot, rendered as the next `$n`
    Slot(Param),
}

/// SQL text interleaved with typed parameter slots.
///
/// The number of slots is, by construction, the number of bindings the
/// fragment owns.
#[derive(Clone, Debug, Default)]
pub struct Fragment {
    pieces: Vec<Piece>,
}

impl Fragment {
    /// Create an empty fragment.
    pub fn new() -> Self {
        Self { pieces: Vec::new() }
    }

    /// Create a fragment holding only text.
    pub fn text(sql: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_text(&sql.into());
        fragment
    }

    /// Parse a template whose `?` marks stand for `params`, in order.
    ///
    /// `??` is an escaped literal `?` (e.g. the jsonb key-exists operator). A
    /// `?` inside a string literal (standard, `E'..'` or dollar-quoted), a
    /// quoted identifier or a comment is left alone. The placeholder count
    /// must equal `params.len()`.
    pub fn template(sql: &str, params: Vec<Param>) -> Result<Self, UsageError> {
        let segments = split_placeholders(sql);
        let placeholders = segments
            .iter()
            .filter(|s| matches!(s, Segment::Placeholder))
            .count();
        if placeholders != params.len() {
            return Err(UsageError::PlaceholderMismatch {
                fragment: sql.to_string(),
                placeholders,
                bindings: params.len(),
            });
        }

        let mut fragment = Self::new();
        let mut params = params.into_iter();
        for segment in segments {
            match segment {
                Segment::Text(text) => fragment.push_text(&text),
                Segment::Placeholder => {
                    if let Some(param) = params.next() {
                        fragment.push_slot(param);
                    }
                }
            }
        }
        Ok(fragment)
    }

    /// Append text, merging with a trailing text piece.
    pub fn push_text(&mut self, sql: &str) {
        if sql.is_empty() {
            return;
        }
        if let Some(Piece::Text(last)) = self.pieces.last_mut() {
            last.push_str(sql);
        } else {
            self.pieces.push(Piece::Text(sql.to_string()));
        }
    }

    /// Append a parameter slot.
    pub fn push_slot(&mut self, param: Param) {
        self.pieces.push(Piece::Slot(param));
    }

    /// Number of parameter slots.
    pub fn slot_count(&self) -> usize {
        self.pieces
            .iter()
            .filter(|p| matches!(p, Piece::Slot(_)))
            .count()
    }

    /// The bindings this fragment owns, left to right.
    pub fn bindings(&self) -> impl Iterator<Item = &Param> {
        self.pieces.iter().filter_map(|p| match p {
            Piece::Slot(param) => Some(param),
            Piece::Text(_) => None,
        })
    }

    /// Check if the fragment has no pieces.
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }
}

/// Accumulates statement text and its single flat binding list.
#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: ParamList,
}

impl SqlWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append literal SQL.
    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Bind a value and write its `$n` placeholder.
    pub fn push_param(&mut self, param: Param) {
        let idx = self.params.push_param(param);
        self.sql.push('$');
        self.sql.push_str(&idx.to_string());
    }

    /// Write a fragment, numbering its slots after every binding written so far.
    pub fn push_fragment(&mut self, fragment: &Fragment) {
        for piece in &fragment.pieces {
            match piece {
                Piece::Text(text) => self.sql.push_str(text),
                Piece::Slot(param) => self.push_param(param.clone()),
            }
        }
    }

    /// Number of bindings written so far.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Finish and return `(sql, bindings)`.
    pub fn finish(self) -> (String, ParamList) {
        (self.sql, self.params)
    }
}

enum Segment {
    Text(String),
    Placeholder,
}

/// Split a template into text and `?` placeholders.
///
/// Quoted literals and identifiers (`'..'`, `E'..'`, `".."`, `$tag$..$tag$`)
/// and comments are copied through untouched.
fn split_placeholders(sql: &str) -> Vec<Segment> {
    let chars: Vec<char> = sql.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        let rest = &chars[i..];
        let after_ident = i > 0 && is_ident_char(chars[i - 1]);
        let len = match (rest[0], rest.get(1)) {
            ('?', Some('?')) => {
                text.push('?');
                i += 2;
                continue;
            }
            ('?', _) => {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Placeholder);
                i += 1;
                continue;
            }
            ('\'', _) => {
                // E'..' only when the E is a token of its own, not the tail of a name.
                let escape_string = i > 0
                    && matches!(chars[i - 1], 'e' | 'E')
                    && !(i > 1 && is_ident_char(chars[i - 2]));
                quoted_len(rest, '\'', escape_string)
            }
            ('"', _) => quoted_len(rest, '"', false),
            ('-', Some('-')) => rest
                .iter()
                .position(|&c| c == '\n')
                .map_or(rest.len(), |n| n + 1),
            ('/', Some('*')) => block_comment_len(rest),
            ('$', _) if !after_ident => dollar_quoted_len(rest).unwrap_or(1),
            _ => 1,
        };
        text.extend(&rest[..len]);
        i += len;
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Length of a quoted run starting at `s[0]`. A doubled quote is an escaped
/// quote; with `backslash` set, `\x` escapes any character. Unterminated runs
/// extend to the end.
fn quoted_len(s: &[char], quote: char, backslash: bool) -> usize {
    let mut j = 1;
    while j < s.len() {
        match s[j] {
            '\\' if backslash => j += 2,
            c if c == quote => {
                if s.get(j + 1) == Some(&quote) {
                    j += 2;
                } else {
                    return j + 1;
                }
            }
            _ => j += 1,
        }
    }
    s.len()
}

/// `/* .. */`, which nests in Postgres.
fn block_comment_len(s: &[char]) -> usize {
    let mut depth = 1;
    let mut j = 2;
    while j < s.len() {
        match (s[j], s.get(j + 1)) {
            ('/', Some('*')) => {
                depth += 1;
                j += 2;
            }
            ('*', Some('/')) => {
                depth -= 1;
                j += 2;
                if depth == 0 {
                    return j;
                }
            }
            _ => j += 1,
        }
    }
    s.len()
}

/// `$tag$ .. $tag$` starting at `s[0]`; `None` when `s` does not open a
/// dollar quote (for example a positional `$1`).
fn dollar_quoted_len(s: &[char]) -> Option<usize> {
    let tag_end = s[1..].iter().position(|&c| c == '$')? + 1;
    let tag = &s[1..tag_end];
    let valid_tag = tag.first().is_none_or(|c| !c.is_ascii_digit())
        && tag.iter().all(|&c| c.is_alphanumeric() || c == '_');
    if !valid_tag {
        return None;
    }
    let delimiter = &s[..=tag_end];
    let body = tag_end + 1;
    let close = s[body..]
        .windows(delimiter.len())
        .position(|w| w == delimiter)
        .map_or(s.len(), |n| body + n + delimiter.len());
    Some(close)
}
