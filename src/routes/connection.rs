//! Connection management route handlers
//!
//! Registers the source and target databases a transfer runs against.

use crate::connection::{ConnectionInfo, ConnectionManager, ConnectionTestResult};
use crate::error::{validation_error, ApiResult};
use crate::models::{
    ConnectRequest, ConnectionListResponse, MessageResponse, OrderResponse, ReferencesResponse,
    SuccessResponse, TestConnectionRequest,
};
use crate::state::SharedState;
use crate::transfer;
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, info};
use validator::Validate;

/// Connect to a database using a connection string
pub async fn connect(
    State(state): State<SharedState>,
    Json(payload): Json<ConnectRequest>,
) -> ApiResult<Json<SuccessResponse<ConnectionInfo>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    debug!("Connecting to database with connection string");

    let info = state
        .connections
        .connect(&payload.connection_string, payload.id, payload.name)
        .await?;

    Ok(Json(SuccessResponse::with_data(
        format!("Successfully connected to '{}'.", info.database),
        info,
    )))
}

/// Test a connection without adding it
pub async fn test_connection(
    Json(payload): Json<TestConnectionRequest>,
) -> ApiResult<Json<SuccessResponse<ConnectionTestResult>>> {
    payload.validate().map_err(|e| validation_error(e.to_string()))?;

    let result = ConnectionManager::test_connection(&payload.connection_string).await?;

    Ok(Json(SuccessResponse::with_data(
        "Connection test successful.",
        result,
    )))
}

/// List all registered connections
pub async fn list_connections(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ConnectionListResponse>>> {
    let connections = state.connections.list_connections().await;

    Ok(Json(SuccessResponse::with_data(
        format!("{} active connection(s).", connections.len()),
        ConnectionListResponse { connections },
    )))
}

/// Disconnect from a specific database
pub async fn disconnect(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.connections.disconnect(&id).await?;

    Ok(Json(MessageResponse::new(format!(
        "Disconnected from connection {} successfully.",
        id
    ))))
}

/// Foreign key edges of a connection's schema
pub async fn references(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse<ReferencesResponse>>> {
    let store = state.connections.require(&id).await?.store();
    let references = transfer::references(&store).await?;

    Ok(Json(SuccessResponse::with_data(
        format!("{} foreign key reference(s).", references.len()),
        ReferencesResponse { references },
    )))
}

/// Insertion order over every table of a connection
pub async fn dependency_order(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse<OrderResponse>>> {
    let store = state.connections.require(&id).await?.store();
    let order = transfer::dependency_order(&store).await?;

    info!("Dependency order for {}: {} tables", id, order.len());

    Ok(Json(SuccessResponse::with_data(
        format!("{} table(s) in insertion order.", order.len()),
        OrderResponse { order },
    )))
}
