//! Application builder: wires router, middleware, state and the queue
//! engine into a running server.

use std::future::IntoFuture;
use std::time::Duration;

use axum::Router;
use axum::middleware as axum_middleware;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use viewgate_core::config::AppConfig;
use viewgate_core::error::AppError;
use viewgate_realtime::QueueEngine;

use crate::middleware::cors::build_cors_layer;
use crate::middleware::logging::request_logging;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);
    build_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum_middleware::from_fn(request_logging))
}

/// Runs the Viewgate server until Ctrl+C / SIGTERM.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    info!("Starting Viewgate server...");

    // ── Step 1: Queue engine ─────────────────────────────────────
    let engine = QueueEngine::new(config.queue.clone());

    // ── Step 2: Liveness monitor ─────────────────────────────────
    let monitor = engine.spawn_monitor();

    // ── Step 3: Build and start HTTP server ──────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let app = build_app(AppState::new(config, engine.clone()));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    info!("Viewgate server listening on {}", addr);

    let (stopping_tx, mut stopping_rx) = watch::channel(false);
    let shutdown_engine = engine.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Ending sessions lets their upgraded connections drain.
        shutdown_engine.shutdown();
        let _ = stopping_tx.send(true);
    });

    let forced = async move {
        if stopping_rx.wait_for(|stopping| *stopping).await.is_ok() {
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = server.into_future() => {
            result.map_err(|e| AppError::internal(format!("Server error: {e}")))?;
        }
        _ = forced => {
            warn!(grace_seconds = grace.as_secs(), "Shutdown grace period elapsed, forcing exit");
        }
    }

    // ── Step 4: Stop background tasks ────────────────────────────
    engine.shutdown();
    if let Err(e) = monitor.await {
        warn!(error = %e, "Liveness monitor task failed");
    }

    info!("Viewgate server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
