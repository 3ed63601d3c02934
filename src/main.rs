//! BillHub Server: real-time messaging for the billboard marketplace.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

use billhub_api::{AppState, build_app};
use billhub_auth::jwt::JwtVerifier;
use billhub_core::config::AppConfig;
use billhub_core::error::AppError;
use billhub_realtime::RealtimeEngine;
use billhub_store::MemoryMessageStore;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("BILLHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let dir = std::env::var("BILLHUB_CONFIG_DIR").unwrap_or_else(|_| "config".to_string());
    AppConfig::load_from(&dir, &env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting BillHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Identity verification ────────────────────────────
    if config.auth.jwt_secret.is_empty() {
        return Err(AppError::configuration("auth.jwt_secret must be set"));
    }
    if config.auth.jwt_secret == "CHANGE_ME_IN_PRODUCTION" {
        tracing::warn!("Using the default JWT secret; set BILLHUB__AUTH__JWT_SECRET");
    }
    let identity = Arc::new(JwtVerifier::new(&config.auth));

    // ── Step 2: Message store ────────────────────────────────────
    let store = Arc::new(MemoryMessageStore::open());
    tracing::info!("Using in-memory message store");

    // ── Step 3: Real-time engine ─────────────────────────────────
    let realtime = Arc::new(RealtimeEngine::new(
        config.realtime.clone(),
        identity,
        store,
    ));

    // ── Step 4: HTTP application ─────────────────────────────────
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(Arc::new(config), realtime.clone());
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "BillHub server listening");

    // ── Step 5: Serve until shutdown ─────────────────────────────
    let engine = realtime.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        engine.shutdown();
    });

    server.await?;

    // Give connection tasks a moment to unregister.
    let deadline = tokio::time::Instant::now() + grace;
    while realtime.registry.connection_count() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    tracing::info!("BillHub server stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
