//! Error handling module
//!
//! Three layers of errors:
//! - [`StoreError`](crate::store::StoreError): a failure at the relational store boundary
//! - [`CloneError`]: the typed failures of Download / Sequence / Upload
//! - [`AppError`]: what the HTTP surface turns into a JSON error response

use crate::store::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Failures of the extraction, sequencing and loading core.
/// None of them is retried; each surfaces to the caller immediately.
#[derive(Error, Debug)]
pub enum CloneError {
    #[error("Catalog introspection failed: {0}")]
    Introspection(#[source] StoreError),

    #[error("Fetching {table} where {column} = {value} failed: {source}")]
    Query {
        table: String,
        column: String,
        value: String,
        #[source]
        source: StoreError,
    },

    #[error("Inserting into {table} failed: {source}")]
    Insert {
        table: String,
        #[source]
        source: StoreError,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Foreign key cycle between tables: {}", tables.join(", "))]
    CyclicSchema { tables: Vec<String> },

    #[error("{table}.{column} = {value} references {referenced_table}, but no new identifier was recorded for it")]
    UnresolvedReference {
        table: String,
        column: String,
        referenced_table: String,
        value: String,
    },

    #[error("Rows of {table} cannot be ordered parent-first: {column} = {value} refers to a row that comes later")]
    SelfReferenceOrder {
        table: String,
        column: String,
        value: String,
    },

    #[error("Operation exceeded its deadline of {0:?}")]
    Timeout(Duration),
}

impl CloneError {
    /// Short machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            CloneError::Introspection(_) => "INTROSPECTION_ERROR",
            CloneError::Query { .. } => "QUERY_ERROR",
            CloneError::Insert { .. } => "INSERT_ERROR",
            CloneError::Configuration(_) => "CONFIGURATION_ERROR",
            CloneError::CyclicSchema { .. } => "CYCLIC_SCHEMA",
            CloneError::UnresolvedReference { .. } => "UNRESOLVED_REFERENCE",
            CloneError::SelfReferenceOrder { .. } => "SELF_REFERENCE_ORDER",
            CloneError::Timeout(_) => "TIMEOUT",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CloneError::Introspection(_) | CloneError::Query { .. } | CloneError::Insert { .. } => {
                StatusCode::BAD_GATEWAY
            }
            CloneError::Configuration(_) => StatusCode::BAD_REQUEST,
            CloneError::CyclicSchema { .. } => StatusCode::CONFLICT,
            CloneError::UnresolvedReference { .. } | CloneError::SelfReferenceOrder { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CloneError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

/// A failed operation together with what it had built so far.
///
/// The partial value is for diagnostics only and is never a complete result.
#[derive(Debug)]
pub struct Partial<T> {
    pub error: CloneError,
    pub partial: T,
}

impl<T> Partial<T> {
    pub fn new(error: CloneError, partial: T) -> Self {
        Self { error, partial }
    }
}

impl<T> fmt::Display for Partial<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for Partial<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Application-wide error type for the HTTP surface
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transfer(#[from] CloneError),

    #[error("{error}")]
    PartialTransfer {
        error: CloneError,
        partial: serde_json::Value,
    },
}

impl<T: Serialize> From<Partial<T>> for AppError {
    fn from(failure: Partial<T>) -> Self {
        match serde_json::to_value(&failure.partial) {
            Ok(partial) => AppError::PartialTransfer {
                error: failure.error,
                partial,
            },
            Err(_) => AppError::Transfer(failure.error),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details, partial) = match self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                    None,
                )
            }
            AppError::Connection(msg) => (
                StatusCode::BAD_GATEWAY,
                "CONNECTION_ERROR",
                msg,
                None,
                None,
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg,
                None,
                None,
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None, None),
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg),
                    None,
                )
            }
            AppError::Transfer(e) => {
                error!("Transfer failed: {}", e);
                (e.status(), e.code(), e.to_string(), None, None)
            }
            AppError::PartialTransfer { error: e, partial } => {
                error!("Transfer failed: {}", e);
                (e.status(), e.code(), e.to_string(), None, Some(partial))
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
            partial,
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}
