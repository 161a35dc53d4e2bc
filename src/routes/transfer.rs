//! Download / Upload / Clone route handlers

use crate::error::{validation_error, ApiResult};
use crate::models::{
    download_options, CloneRequest, CloneResponse, DownloadRequest, DownloadResponse,
    SuccessResponse, UploadRequest, UploadResponse,
};
use crate::state::SharedState;
use crate::transfer;
use axum::{extract::State, Json};
use tracing::info;
use validator::Validate;

/// Extract the subset reachable from the given starting points
pub async fn download(
    State(state): State<SharedState>,
    Json(payload): Json<DownloadRequest>,
) -> ApiResult<Json<SuccessResponse<DownloadResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let options = download_options(payload.include, payload.dont_recurse, state.transfer.timeout)?;
    let store = state.connections.require(&payload.connection_id).await?.store();

    let subset = transfer::download(&store, &options).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Downloaded {} row(s).", subset.row_count()),
        DownloadResponse::from(subset),
    )))
}

/// Insert a downloaded subset into the target connection
pub async fn upload(
    State(state): State<SharedState>,
    Json(payload): Json<UploadRequest>,
) -> ApiResult<Json<SuccessResponse<UploadResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let store = state.connections.require(&payload.connection_id).await?.store();
    let identifiers = transfer::upload(&store, &payload.data, &state.upload_options()).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Uploaded {} row(s).", payload.data.row_count()),
        UploadResponse {
            inserted_rows: payload.data.row_count(),
            identifiers,
        },
    )))
}

/// Download from the source connection, then upload into the target
pub async fn clone_subset(
    State(state): State<SharedState>,
    Json(payload): Json<CloneRequest>,
) -> ApiResult<Json<SuccessResponse<CloneResponse>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    if payload.source_id == payload.target_id {
        return Err(validation_error("Source and target must be different connections"));
    }

    let options = download_options(payload.include, payload.dont_recurse, state.transfer.timeout)?;
    let source = state.connections.require(&payload.source_id).await?.store();
    let target = state.connections.require(&payload.target_id).await?.store();

    let subset = transfer::download(&source, &options).await?;
    let identifiers = transfer::upload(&target, &subset, &state.upload_options()).await?;

    info!(
        "Cloned {} row(s) from {} into {}",
        subset.row_count(),
        payload.source_id,
        payload.target_id
    );

    Ok(Json(SuccessResponse::with_data(
        format!("Cloned {} row(s).", subset.row_count()),
        CloneResponse {
            row_count: subset.row_count(),
            checksum: subset.checksum(),
            subset,
            identifiers,
        },
    )))
}
