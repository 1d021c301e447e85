//! WebSocket queue session handler.
//!
//! One receive loop per session feeds frames to the engine; a separate
//! writer task drains the session's outbound buffer into the socket so a
//! slow client never holds up queue mutations.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use viewgate_core::types::{ParticipantId, ResourceId};

use crate::error::ApiError;
use crate::state::AppState;

/// How long the writer may take to flush its close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Query parameters for a queue session.
#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    /// Caller-supplied participant id.
    pub participant: Option<String>,
}

/// GET /queue/{resource_id}?participant={participant_id}
pub async fn ws_handler(
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<SessionQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // Reject before upgrade so no queue is touched
    let (resource_id, participant_id) = state
        .engine
        .parse_ids(&resource_id, query.participant.as_deref())
        .inspect_err(|e| warn!(error = %e, "Queue session rejected"))?;

    Ok(ws.on_upgrade(move |socket| handle_session(state, resource_id, participant_id, socket)))
}

/// Drives one established queue session until either side ends it.
async fn handle_session(
    state: AppState,
    resource_id: ResourceId,
    participant_id: ParticipantId,
    mut socket: WebSocket,
) {
    let opened = match state
        .engine
        .open_session(resource_id.clone(), participant_id.clone())
        .await
    {
        Ok(opened) => opened,
        Err(e) => {
            warn!(
                resource_id = %resource_id,
                participant_id = %participant_id,
                error = %e,
                "Failed to open queue session"
            );
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    let handle = opened.handle;
    let mut outbound_rx = opened.outbound;
    let cancel = handle.cancelled();
    let conn_id = handle.id;
    let (mut ws_tx, mut ws_rx) = socket.split();

    // Spawn outbound message forwarder
    let writer_cancel = cancel.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                frame = outbound_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    // Process inbound messages
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(conn_id = %conn_id, "Queue session ended by server");
                break;
            }
            next = ws_rx.next() => {
                match next {
                    Some(Ok(Message::Text(text))) => {
                        state.engine.handle_frame(&handle, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(conn_id = %conn_id, "Client closed queue session");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    // Cleanup
    state.engine.close_session(&handle).await;
    handle.terminate();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
}
