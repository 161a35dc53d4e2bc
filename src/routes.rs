//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod connection;
mod transfer;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))
        // Connection routes
        .route(
            "/api/connections",
            post(connection::connect).get(connection::list_connections),
        )
        .route("/api/connections/test", post(connection::test_connection))
        .route("/api/connections/{id}", delete(connection::disconnect))
        .route("/api/connections/{id}/references", get(connection::references))
        .route("/api/connections/{id}/order", get(connection::dependency_order))
        // Transfer routes
        .route("/api/download", post(transfer::download))
        .route("/api/upload", post(transfer::upload))
        .route("/api/clone", post(transfer::clone_subset))
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
