//! Blood Bank Server - hosts the blood bank inventory application
//!
//! This is the main entry point. It handles:
//! - Sign-in against Firebase Identity Toolkit (or the in-memory backend)
//! - Live sync of hospital inventory from Firestore
//! - HTTP endpoints for the dashboard, search, and withdrawal requests
//! - WebSocket push of the UI state

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blood_bank_server::config::BackendConfig;
use blood_bank_server::http::build_router;
use blood_bank_server::util::time::init_server_time;
use blood_bank_server::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Blood Bank Server");
    info!("Server address: {}", config.server_addr);
    match &config.backend {
        BackendConfig::Firestore(settings) => {
            info!(project = %settings.project_id, "Using Firestore backend")
        }
        BackendConfig::Memory { .. } => info!("Using in-memory backend"),
    }
    info!("Collection: {}", config.collection_path());

    // Create application state and follow auth changes
    let state = AppState::new(config.clone());
    let auth_listener = state.start();

    // Build router
    let router = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("State stream: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    auth_listener.abort();

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
