//! Relational store boundary
//!
//! The core never talks to a database directly. Everything it needs from a
//! source or target database goes through [`RelationalStore`], implemented
//! once per database technology.

pub mod postgres;
pub mod queries;

#[cfg(test)]
pub mod memory;

pub use postgres::PgStore;

use crate::introspection::{AutoValueSet, PrimaryKeys, TableReference};
use crate::subset::{Row, Value};
use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Unexpected row shape: {0}")]
    Decode(String),

    #[error("{0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Catalog reads and row-level reads/writes against one database
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Names of all base tables
    async fn list_tables(&self) -> StoreResult<Vec<String>>;

    /// One edge per single-column foreign key constraint
    async fn list_references(&self) -> StoreResult<Vec<TableReference>>;

    /// Declared primary key columns per table
    async fn list_primary_keys(&self) -> StoreResult<PrimaryKeys>;

    /// Columns whose value the server generates
    async fn list_auto_value_columns(&self) -> StoreResult<AutoValueSet>;

    /// Rows of `table` where `column = value`. A null value yields no rows
    /// and issues no query.
    async fn fetch_rows(&self, table: &str, column: &str, value: &Value) -> StoreResult<Vec<Row>>;

    /// Insert one row. When `auto_value_column` is given, the value the
    /// server generated for it is returned as text.
    async fn insert_row(
        &self,
        table: &str,
        columns: &[String],
        values: &[Value],
        auto_value_column: Option<&str>,
    ) -> StoreResult<Option<String>>;
}
