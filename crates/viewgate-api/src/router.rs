//! Route definitions for the Viewgate HTTP API.
//!
//! Status and health reads are mounted under `/api`; queue sessions live
//! at `/queue/{resource_id}`.

use axum::{Router, routing::get};

use crate::handlers;
use crate::state::AppState;

/// Build the Axum router with all routes, threading `AppState` through
/// every handler.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(queue_routes())
        .merge(health_routes());

    let ws_routes = Router::new().route("/queue/{resource_id}", get(handlers::ws::ws_handler));

    Router::new()
        .nest("/api", api_routes)
        .merge(ws_routes)
        .with_state(state)
}

/// Queue status reads
fn queue_routes() -> Router<AppState> {
    Router::new()
        .route("/queues", get(handlers::queue::list_queues))
        .route(
            "/queues/{resource_id}/status",
            get(handlers::queue::queue_status),
        )
}

/// Health check endpoints
fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/health/detailed", get(handlers::health::health_detailed))
}
