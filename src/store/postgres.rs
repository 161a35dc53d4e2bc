//! PostgreSQL implementation of the relational store
//!
//! Rows travel as JSON objects in both directions, so the store never has to
//! know column types: Postgres coerces values with `json_populate_record`.

use super::queries::{
    SqlBuilder, LIST_AUTO_VALUE_COLUMNS, LIST_PRIMARY_KEYS, LIST_REFERENCES, LIST_TABLES,
};
use super::{RelationalStore, StoreError, StoreResult};
use crate::introspection::{AutoValueSet, PrimaryKeys, TableColumns, TableReference};
use crate::subset::{Row, Value};
use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::debug;

/// Store backed by a deadpool-postgres pool
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn table_columns(&self, query: &str) -> StoreResult<TableColumns> {
        let client = self.pool.get().await?;
        let rows = client.query(query, &[]).await?;

        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<_, String>("table_name"),
                    row.get::<_, String>("column_name"),
                )
            })
            .collect())
    }
}

#[async_trait]
impl RelationalStore for PgStore {
    async fn list_tables(&self) -> StoreResult<Vec<String>> {
        let client = self.pool.get().await?;
        let rows = client.query(LIST_TABLES, &[]).await?;
        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }

    async fn list_references(&self) -> StoreResult<Vec<TableReference>> {
        let client = self.pool.get().await?;
        let rows = client.query(LIST_REFERENCES, &[]).await?;

        Ok(rows
            .iter()
            .map(|row| TableReference {
                table: row.get("table_name"),
                column: row.get("column_name"),
                referenced_table: row.get("referenced_table"),
                referenced_column: row.get("referenced_column"),
            })
            .collect())
    }

    async fn list_primary_keys(&self) -> StoreResult<PrimaryKeys> {
        self.table_columns(LIST_PRIMARY_KEYS).await
    }

    async fn list_auto_value_columns(&self) -> StoreResult<AutoValueSet> {
        self.table_columns(LIST_AUTO_VALUE_COLUMNS).await
    }

    async fn fetch_rows(&self, table: &str, column: &str, value: &Value) -> StoreResult<Vec<Row>> {
        if value.is_null() {
            return Ok(Vec::new());
        }

        let query = SqlBuilder::select_rows(table, column);
        let mut predicate = serde_json::Map::new();
        predicate.insert(column.to_string(), value.clone());
        let predicate = Value::Object(predicate);

        debug!("SELECT * FROM {} WHERE {} = {}", table, column, value);

        let client = self.pool.get().await?;
        let rows = client.query(&query, &[&predicate]).await?;

        rows.iter()
            .map(|row| match row.get::<_, Value>("row") {
                Value::Object(map) => Ok(Row::from(map)),
                other => Err(StoreError::Decode(format!(
                    "expected a JSON object for a row of {table}, got {other}"
                ))),
            })
            .collect()
    }

    async fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: &[Value],
        auto_value_column: Option<&str>,
    ) -> StoreResult<Option<String>> {
        if columns.len() != values.len() {
            return Err(StoreError::Backend(format!(
                "{} columns but {} values for {}",
                columns.len(),
                values.len(),
                table
            )));
        }

        let query = SqlBuilder::insert_row(table, columns, auto_value_column);
        let record: serde_json::Map<String, Value> = columns
            .iter()
            .cloned()
            .zip(values.iter().cloned())
            .collect();
        let record = Value::Object(record);

        debug!("{} {}", query, record);

        let client = self.pool.get().await?;
        let params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = if columns.is_empty() {
            Vec::new()
        } else {
            vec![&record]
        };

        match auto_value_column {
            Some(_) => {
                let row = client.query_one(&query, &params).await?;
                Ok(row.get::<_, Option<String>>(0))
            }
            None => {
                client.execute(&query, &params).await?;
                Ok(None)
            }
        }
    }
}
