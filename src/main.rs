//! sqlclone API server
//!
//! Exposes Download / Upload of referentially consistent subsets over HTTP.
//! Connections are registered at runtime through the API, or at startup
//! from `SOURCE_DATABASE_URL` / `TARGET_DATABASE_URL`.

use sqlclone::config::Settings;
use sqlclone::connection::ConnectionManager;
use sqlclone::routes::create_router;
use sqlclone::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting sqlclone...");

    let settings = Settings::load()?;
    info!("Configuration loaded successfully");

    let connections = ConnectionManager::new(settings.database.max_pool_size);
    register_preset_connections(&connections, &settings).await;

    let state = Arc::new(AppState::new(connections, settings.transfer.clone()));
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("Server listening on http://{}", addr);
    info!("   POST /api/connections              - Register a database");
    info!("   GET  /api/connections/{{id}}/order   - Insertion order of all tables");
    info!("   POST /api/download                 - Extract a subset");
    info!("   POST /api/upload                   - Insert a subset");
    info!("   POST /api/clone                    - Download and upload in one call");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlclone=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Register `source` / `target` from the environment. A failure is logged
/// and the server starts without that connection.
async fn register_preset_connections(connections: &ConnectionManager, settings: &Settings) {
    let presets = [
        ("source", settings.database.source_url.as_deref()),
        ("target", settings.database.target_url.as_deref()),
    ];

    for (id, url) in presets {
        let Some(url) = url else { continue };
        match connections
            .connect(url, Some(id.to_string()), Some(id.to_string()))
            .await
        {
            Ok(info) => info!("Registered '{}' connection to {}", id, info.database),
            Err(e) => warn!("Could not register '{}' connection: {}", id, e),
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
