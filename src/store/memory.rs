//! In-memory relational store used by the tests.
//!
//! Behaves like a tiny database: tables hold rows, auto-value columns receive
//! generated identifiers on insert and every insert is logged in order.

use super::{RelationalStore, StoreError, StoreResult};
use crate::introspection::{AutoValueSet, PrimaryKeys, TableColumns, TableReference};
use crate::subset::{Row, Value};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// First identifier handed out for a table's auto-value column
const FIRST_GENERATED_ID: i64 = 1001;

/// One logged insert: the table and the row as it was stored
#[derive(Debug, Clone, PartialEq)]
pub struct InsertedRow {
    pub table: String,
    pub row: Row,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<String, Vec<Row>>,
    next_id: BTreeMap<String, i64>,
    inserted: Vec<InsertedRow>,
    queries: Vec<(String, String, Value)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Vec<String>,
    references: Vec<TableReference>,
    primary_keys: PrimaryKeys,
    auto_values: AutoValueSet,
    fail_catalog: bool,
    fail_fetch: HashSet<String>,
    fail_insert: HashSet<String>,
    latency: Option<Duration>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table with its primary key and optional auto-value column
    pub fn with_table(mut self, name: &str, primary_key: &[&str], auto_value: Option<&str>) -> Self {
        self.tables.push(name.to_string());
        for column in primary_key {
            self.primary_keys.insert(name, *column);
        }
        if let Some(column) = auto_value {
            self.auto_values.insert(name, column);
        }
        self
    }

    pub fn with_auto_value(mut self, table: &str, column: &str) -> Self {
        self.auto_values.insert(table, column);
        self
    }

    pub fn with_reference(mut self, reference: TableReference) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_row(self, table: &str, row: Row) -> Self {
        self.lock().rows.entry(table.to_string()).or_default().push(row);
        self
    }

    pub fn failing_catalog(mut self) -> Self {
        self.fail_catalog = true;
        self
    }

    pub fn failing_fetch(mut self, table: &str) -> Self {
        self.fail_fetch.insert(table.to_string());
        self
    }

    pub fn failing_insert(mut self, table: &str) -> Self {
        self.fail_insert.insert(table.to_string());
        self
    }

    /// Delay every row-level call, for deadline tests
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Inserts in the order they happened
    pub fn inserted(&self) -> Vec<InsertedRow> {
        self.lock().inserted.clone()
    }

    /// Inserted rows of one table, in order
    pub fn inserted_into(&self, table: &str) -> Vec<Row> {
        self.lock()
            .inserted
            .iter()
            .filter(|i| i.table == table)
            .map(|i| i.row.clone())
            .collect()
    }

    /// Every fetch issued, as (table, column, value)
    pub fn queries(&self) -> Vec<(String, String, Value)> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_catalog(&self) -> StoreResult<()> {
        if self.fail_catalog {
            return Err(StoreError::Backend("catalog unavailable".to_string()));
        }
        Ok(())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn list_tables(&self) -> StoreResult<Vec<String>> {
        self.check_catalog()?;
        Ok(self.tables.clone())
    }

    async fn list_references(&self) -> StoreResult<Vec<TableReference>> {
        self.check_catalog()?;
        Ok(self.references.clone())
    }

    async fn list_primary_keys(&self) -> StoreResult<PrimaryKeys> {
        self.check_catalog()?;
        Ok(self.primary_keys.clone())
    }

    async fn list_auto_value_columns(&self) -> StoreResult<TableColumns> {
        self.check_catalog()?;
        Ok(self.auto_values.clone())
    }

    async fn fetch_rows(&self, table: &str, column: &str, value: &Value) -> StoreResult<Vec<Row>> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        self.delay().await;
        if self.fail_fetch.contains(table) {
            return Err(StoreError::Backend(format!("relation \"{table}\" is unavailable")));
        }

        let mut inner = self.lock();
        inner
            .queries
            .push((table.to_string(), column.to_string(), value.clone()));

        Ok(inner
            .rows
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get(column) == value)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: &[Value],
        auto_value_column: Option<&str>,
    ) -> StoreResult<Option<String>> {
        self.delay().await;
        if self.fail_insert.contains(table) {
            return Err(StoreError::Backend(format!(
                "insert into \"{table}\" violates a constraint"
            )));
        }

        let mut inner = self.lock();
        let mut stored: Vec<(String, Value)> = columns
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();

        let generated = auto_value_column.map(|column| {
            let next = inner
                .next_id
                .entry(table.to_string())
                .or_insert(FIRST_GENERATED_ID);
            let id = *next;
            *next += 1;
            stored.insert(0, (column.to_string(), Value::from(id)));
            id.to_string()
        });

        let row: Row = stored.into_iter().collect();
        inner.rows.entry(table.to_string()).or_default().push(row.clone());
        inner.inserted.push(InsertedRow {
            table: table.to_string(),
            row,
        });

        Ok(generated)
    }
}
