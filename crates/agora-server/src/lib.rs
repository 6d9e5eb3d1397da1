//! agora-server: HTTP API server and session sweeper.
//!
//! This crate ties the agora crates together into a running server:
//!
//! - Axum-based JSON API with session authentication, rate limiting and SSE
//! - Background sweeper that deletes expired sessions
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod sweeper;

use std::net::SocketAddr;

use agora_core::config::Config;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

/// Start the agora server.
///
/// Initializes the database, constructs the [`AppContext`], spawns the
/// session sweeper and serves HTTP until a shutdown signal arrives.
pub async fn start(config: Config) -> agora_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let db = agora_db::pool::init_pool(&db_str)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| agora_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(db, config);
    let cancel = CancellationToken::new();

    let sweeper_handle = tokio::spawn(sweeper::run_session_sweeper(ctx.clone(), cancel.clone()));

    let app = router::build_router(ctx);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| agora_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;
    tracing::info!("Starting server on {addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    cancel.cancel();
    let _ = sweeper_handle.await;

    served.map_err(|e| agora_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM) or cancellation.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        _ = cancel.cancelled() => tracing::info!("Cancellation requested, shutting down"),
    }
}
