//! Captured rows
//!
//! A [`Subset`] (a.k.a. dump) maps table names to the rows captured for them,
//! in traversal order. Rows are ordered column maps of JSON scalars.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Dynamically typed scalar as read from the store
pub type Value = serde_json::Value;

static NULL: Value = Value::Null;

/// Textual form of a value, used as identifier map key and sort key.
///
/// Strings are unquoted, numbers and booleans use their display form and
/// anything else is rendered as compact JSON.
pub fn value_text(value: &Value) -> Cow<'_, str> {
    match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        other => Cow::Owned(other.to_string()),
    }
}

/// Order two key values: nulls first, numbers numerically, everything else textually
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        _ => value_text(a).cmp(&value_text(b)),
    }
}

/// One captured row: column name to value, in the store's column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(serde_json::Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a column; a missing column reads as null
    pub fn get(&self, column: &str) -> &Value {
        self.0.get(column).unwrap_or(&NULL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<serde_json::Map<String, Value>> for Row {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Build a [`Row`] from `column => value` pairs
#[macro_export]
macro_rules! row {
    ($($column:expr => $value:tt),* $(,)?) => {
        $crate::subset::Row::from_iter([
            $(($column, ::serde_json::json!($value))),*
        ])
    };
}

/// The extracted rows, grouped by table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Subset {
    tables: BTreeMap<String, Vec<Row>>,
}

impl Subset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row unless an identical one is already captured.
    /// Returns whether the row was added.
    pub fn insert(&mut self, table: &str, row: Row) -> bool {
        if self.contains_row(table, &row) {
            return false;
        }
        self.tables.entry(table.to_string()).or_default().push(row);
        true
    }

    /// Rows captured for `table`, in capture order
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Row-level equality over all columns
    pub fn contains_row(&self, table: &str, row: &Row) -> bool {
        self.rows(table).iter().any(|r| r == row)
    }

    /// Whether a captured row of `table` already has `column = value`.
    /// Linear scan over the captured rows.
    pub fn contains_match(&self, table: &str, column: &str, value: &Value) -> bool {
        self.rows(table).iter().any(|r| r.get(column) == value)
    }

    pub fn has_table(&self, table: &str) -> bool {
        !self.rows(table).is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Row>)> {
        self.tables.iter()
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// SHA-256 over the content, independent of row order within a table
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();

        for (table, rows) in &self.tables {
            let mut encoded: Vec<String> = rows
                .iter()
                .map(|r| serde_json::to_string(r).unwrap_or_default())
                .collect();
            encoded.sort();

            hasher.update(table.as_bytes());
            hasher.update(b"\n");
            for row in &encoded {
                hasher.update(row.as_bytes());
                hasher.update(b"\n");
            }
        }

        format!("{:x}", hasher.finalize())
    }
}
