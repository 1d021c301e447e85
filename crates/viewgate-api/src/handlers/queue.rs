//! Queue status handlers.
//!
//! Both read the published status board and never wait on a queue.

use axum::Json;
use axum::extract::{Path, State};

use viewgate_core::types::ResourceId;
use viewgate_realtime::queue::{QueueStatus, QueueSummary};

use crate::error::ApiError;
use crate::state::AppState;

/// GET /api/queues/{resource_id}/status
pub async fn queue_status(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
) -> Result<Json<QueueStatus>, ApiError> {
    let resource_id =
        ResourceId::parse(&resource_id, state.config.queue.max_resource_id_length)?;
    Ok(Json(state.engine.status(&resource_id)))
}

/// GET /api/queues
pub async fn list_queues(State(state): State<AppState>) -> Json<Vec<QueueSummary>> {
    Json(state.engine.all_statuses())
}
