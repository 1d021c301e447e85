//! Inbound and outbound WebSocket message type definitions.

use serde::{Deserialize, Serialize};

use viewgate_core::types::ResourceId;

use crate::queue::participant::ViewerEntry;

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Liveness signal.
    Heartbeat,
    /// Voluntary departure from the queue.
    Leave,
    /// Request the current viewer listing.
    GetQueueList,
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Result of the join performed when the session opened.
    Init {
        /// Whether the participant was admitted immediately.
        success: bool,
        /// 0 when admitted, otherwise the wait list position.
        position: usize,
        /// Human-readable status.
        message: String,
    },
    /// The participant may now open the resource.
    EnterAllowed {
        /// Resource id.
        resource_id: ResourceId,
        /// Human-readable status.
        message: String,
    },
    /// The participant's wait list position changed.
    QueueUpdate {
        /// New 1-based position.
        position: usize,
        /// Human-readable status.
        message: String,
    },
    /// Acknowledges an explicit leave.
    Left {
        /// Human-readable status.
        message: String,
    },
    /// Full viewer listing.
    QueueList {
        /// Listing payload.
        data: QueueListData,
    },
    /// Heartbeat acknowledgement.
    Heartbeat {
        /// Always `"ok"`.
        status: String,
    },
}

/// Payload of a `queue_list` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueListData {
    /// Resource id.
    pub resource_id: ResourceId,
    /// Number of viewers (occupants plus waiters).
    pub total_count: usize,
    /// Occupants first, then waiters.
    pub viewers: Vec<ViewerEntry>,
}

impl QueueListData {
    /// Wrap a listing.
    pub fn new(resource_id: ResourceId, viewers: Vec<ViewerEntry>) -> Self {
        Self {
            resource_id,
            total_count: viewers.len(),
            viewers,
        }
    }
}
