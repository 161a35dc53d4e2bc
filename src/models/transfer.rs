//! Download / Upload models and DTOs

use crate::introspection::TableReference;
use crate::load::IdentifierMap;
use crate::options::{is_identifier, DownloadOptions, SeedPredicate};
use crate::subset::{Subset, Value};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// One starting point of a download
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SeedRequest {
    #[validate(custom(function = "validate_identifier"))]
    pub table: String,
    #[validate(custom(function = "validate_identifier"))]
    pub column: String,
    pub value: Value,
}

impl From<SeedRequest> for SeedPredicate {
    fn from(seed: SeedRequest) -> Self {
        SeedPredicate::new(seed.table, seed.column, seed.value)
    }
}

/// Request to extract a subset from a connection
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    #[validate(length(min = 1, message = "Connection id is required"))]
    pub connection_id: String,

    #[validate(length(min = 1, message = "At least one starting point is required"))]
    #[validate(nested)]
    pub include: Vec<SeedRequest>,

    #[serde(default)]
    #[validate(custom(function = "validate_table_names"))]
    pub dont_recurse: Vec<String>,
}

/// Request to insert a previously downloaded subset
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[validate(length(min = 1, message = "Connection id is required"))]
    pub connection_id: String,

    pub data: Subset,
}

/// Request to download from one connection and upload into another
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CloneRequest {
    #[validate(length(min = 1, message = "Source connection id is required"))]
    pub source_id: String,

    #[validate(length(min = 1, message = "Target connection id is required"))]
    pub target_id: String,

    #[validate(length(min = 1, message = "At least one starting point is required"))]
    #[validate(nested)]
    pub include: Vec<SeedRequest>,

    #[serde(default)]
    #[validate(custom(function = "validate_table_names"))]
    pub dont_recurse: Vec<String>,
}

/// Build validated download options from request parts
pub fn download_options(
    include: Vec<SeedRequest>,
    dont_recurse: Vec<String>,
    timeout: Option<Duration>,
) -> Result<DownloadOptions, crate::error::CloneError> {
    let builder = include
        .into_iter()
        .fold(DownloadOptions::builder(), |b, seed| b.seed(seed.into()));
    dont_recurse
        .into_iter()
        .fold(builder, |b, table| b.dont_recurse(table))
        .timeout(timeout)
        .build()
}

/// Extracted subset with its content checksum
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub row_count: usize,
    pub checksum: String,
    pub subset: Subset,
}

impl From<Subset> for DownloadResponse {
    fn from(subset: Subset) -> Self {
        Self {
            row_count: subset.row_count(),
            checksum: subset.checksum(),
            subset,
        }
    }
}

/// Old-to-new identifiers recorded by an upload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub inserted_rows: usize,
    pub identifiers: IdentifierMap,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneResponse {
    pub row_count: usize,
    pub checksum: String,
    pub subset: Subset,
    pub identifiers: IdentifierMap,
}

#[derive(Debug, Serialize)]
pub struct ReferencesResponse {
    pub references: Vec<TableReference>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Vec<String>,
}

/// Validate a PostgreSQL identifier
fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if !is_identifier(name) {
        let mut err = ValidationError::new("invalid_identifier");
        err.message = Some(
            "Must start with a letter or underscore and contain only letters, digits, underscores."
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

fn validate_table_names(names: &[String]) -> Result<(), ValidationError> {
    names.iter().try_for_each(|n| validate_identifier(n))
}
