//! Write-side data for INSERT / UPDATE and the fillable whitelist.

use crate::bind::Param;
use serde::Serialize;
use tokio_postgres::types::{Json, ToSql};

/// Insertion-ordered column → value map used as INSERT / UPDATE data.
///
/// Setting a column twice replaces the earlier value in place, so column order
/// is the order of first assignment.
///
/// ```ignore
/// let data = Values::new()
///     .set("title", "Buy milk")
///     .set_opt("description", None::<String>)
///     .set_json("tags", &["errand"])?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Values {
    entries: Vec<(String, Param)>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column value.
    pub fn set<T>(self, column: impl Into<String>, value: T) -> Self
    where
        T: ToSql + Send + Sync + 'static,
    {
        self.set_param(column, Param::new(value))
    }

    /// Set a column only when the value is present.
    pub fn set_opt<T: ToSql + Send + Sync + 'static>(
        self,
        column: impl Into<String>,
        value: Option<T>,
    ) -> Self {
        match value {
            Some(value) => self.set(column, value),
            None => self,
        }
    }

    /// Set a `json`/`jsonb` column from any serializable value.
    pub fn set_json<T: Serialize + ?Sized>(
        self,
        column: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(column, Json(value)))
    }

    /// Set a pre-wrapped parameter.
    pub fn set_param(mut self, column: impl Into<String>, param: Param) -> Self {
        let column = column.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = param,
            None => self.entries.push((column, param)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&Param> {
        self.entries
            .iter()
            .find_map(|(c, p)| (c == column).then_some(p))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Param)> {
        self.entries.iter().map(|(c, p)| (c.as_str(), p))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop one column.
    pub fn without(mut self, column: &str) -> Self {
        self.entries.retain(|(c, _)| c != column);
        self
    }
}

/// Which fields a table mapping accepts on writes, plus its primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fillable {
    fields: Vec<String>,
    primary_key: String,
}

impl Default for Fillable {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            primary_key: "id".to_string(),
        }
    }
}

impl Fillable {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn primary_key_name(&self) -> &str {
        &self.primary_key
    }

    /// Data allowed for INSERT.
    pub fn for_insert(&self, data: &Values) -> Values {
        filter(data, &self.fields)
    }

    /// Data allowed for UPDATE: the whitelist, never the primary key.
    pub fn for_update(&self, data: &Values) -> Values {
        filter(data, &self.fields).without(&self.primary_key)
    }
}

/// Keep only entries whose column is in `allowed`.
///
/// An empty `allowed` list means no restriction is configured and `data`
/// passes through unchanged.
pub fn filter(data: &Values, allowed: &[String]) -> Values {
    if allowed.is_empty() {
        return data.clone();
    }
    Values {
        entries: data
            .entries
            .iter()
            .filter(|(c, _)| allowed.iter().any(|a| a == c))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn filter_drops_unlisted_columns() {
        let data = Values::new().set("title", "x").set("id", 7_i64);
        let out = filter(&data, &allowed(&["title", "description"]));
        assert_eq!(out.columns().collect::<Vec<_>>(), vec!["title"]);
    }

    #[test]
    fn empty_whitelist_passes_through() {
        let data = Values::new().set("title", "x").set("id", 7_i64);
        let out = filter(&data, &[]);
        assert_eq!(out.columns().collect::<Vec<_>>(), vec!["title", "id"]);
    }

    #[test]
    fn set_twice_replaces_in_place() {
        let data = Values::new()
            .set("a", 1_i32)
            .set("b", 2_i32)
            .set("a", 3_i32);
        assert_eq!(data.len(), 2);
        assert_eq!(data.columns().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(format!("{:?}", data.get("a").unwrap()), "3");
    }

    #[test]
    fn set_opt_skips_none() {
        let data = Values::new()
            .set_opt("description", None::<String>)
            .set_opt("title", Some("t".to_string()));
        assert_eq!(data.columns().collect::<Vec<_>>(), vec!["title"]);
    }

    #[test]
    fn update_never_writes_primary_key() {
        let fillable = Fillable::new(Vec::<String>::new()).primary_key("todo_id");
        let data = Values::new().set("todo_id", 1_i64).set("title", "x");
        let out = fillable.for_update(&data);
        assert_eq!(out.columns().collect::<Vec<_>>(), vec!["title"]);
        assert!(fillable.for_insert(&data).contains("todo_id"));
    }

    #[test]
    fn set_json_serializes() {
        let data = Values::new().set_json("tags", &["a", "b"]).unwrap();
        assert!(data.contains("tags"));
    }
}
