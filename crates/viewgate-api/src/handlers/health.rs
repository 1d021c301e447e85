//! Health check handlers.

use axum::Json;
use axum::extract::State;

use crate::dto::response::{DetailedHealthResponse, HealthResponse};
use crate::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// GET /api/health/detailed
pub async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    Json(DetailedHealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        queues: state.engine.registry.len(),
        sessions: state.engine.connections.len(),
        metrics: state.engine.metrics_snapshot(),
    })
}
