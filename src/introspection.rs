//! Schema Introspection Module
//!
//! Reads the catalog of a relational store once per operation: the table list,
//! the single-column foreign key edges, primary keys and auto-valued columns.
//! Nothing here is refreshed mid-operation.

use crate::error::CloneError;
use crate::store::RelationalStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One single-column foreign key: `table.column -> referenced_table.referenced_column`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub table: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl TableReference {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
        }
    }

    /// True when the edge points back into its own table
    pub fn is_self_reference(&self) -> bool {
        self.table == self.referenced_table
    }
}

/// Per-table column lists, in catalog order.
///
/// Used both for primary keys and for the auto-value set (columns whose value
/// is generated by the server and must not be part of an INSERT).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableColumns(BTreeMap<String, Vec<String>>);

/// Columns with a server-side default (`column_default IS NOT NULL` or identity)
pub type AutoValueSet = TableColumns;

/// Declared primary key columns per table
pub type PrimaryKeys = TableColumns;

impl TableColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column to a table's list, keeping first-seen order
    pub fn insert(&mut self, table: impl Into<String>, column: impl Into<String>) {
        let column = column.into();
        let columns = self.0.entry(table.into()).or_default();
        if !columns.contains(&column) {
            columns.push(column);
        }
    }

    pub fn columns(&self, table: &str) -> &[String] {
        self.0.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, table: &str, column: &str) -> bool {
        self.columns(table).iter().any(|c| c == column)
    }

    /// The only column of a single-column list, `None` when empty or composite
    pub fn single(&self, table: &str) -> Option<&str> {
        match self.columns(table) {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Into<String>, C: Into<String>> FromIterator<(T, C)> for TableColumns {
    fn from_iter<I: IntoIterator<Item = (T, C)>>(iter: I) -> Self {
        let mut set = TableColumns::new();
        for (table, column) in iter {
            set.insert(table, column);
        }
        set
    }
}

/// Catalog metadata captured at the start of an operation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub tables: Vec<String>,
    pub references: Vec<TableReference>,
    pub primary_keys: PrimaryKeys,
    pub auto_values: AutoValueSet,
}

/// Reads catalog metadata through any [`RelationalStore`]
pub struct Introspector;

impl Introspector {
    /// Read the full catalog. Any failure is an `IntrospectionError`.
    pub async fn introspect<S>(store: &S) -> Result<Catalog, CloneError>
    where
        S: RelationalStore + ?Sized,
    {
        let tables = store.list_tables().await.map_err(CloneError::Introspection)?;
        let references = Self::references(store).await?;
        let primary_keys = store
            .list_primary_keys()
            .await
            .map_err(CloneError::Introspection)?;
        let auto_values = store
            .list_auto_value_columns()
            .await
            .map_err(CloneError::Introspection)?;

        debug!(
            "Introspected {} tables, {} references, {} tables with primary keys",
            tables.len(),
            references.len(),
            tables.iter().filter(|t| !primary_keys.columns(t).is_empty()).count()
        );

        Ok(Catalog {
            tables,
            references,
            primary_keys,
            auto_values,
        })
    }

    /// Read only the foreign key edges
    pub async fn references<S>(store: &S) -> Result<Vec<TableReference>, CloneError>
    where
        S: RelationalStore + ?Sized,
    {
        store
            .list_references()
            .await
            .map_err(CloneError::Introspection)
    }
}
