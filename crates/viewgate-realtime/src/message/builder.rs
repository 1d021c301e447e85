//! Constructors for outbound messages with their human-readable text.

use viewgate_core::types::ResourceId;

use crate::queue::admission::JoinOutcome;
use crate::queue::participant::ViewerEntry;

use super::types::{OutboundMessage, QueueListData};

/// Result of the opening join.
pub fn init(outcome: &JoinOutcome) -> OutboundMessage {
    let message = match (outcome.admitted, outcome.rejoined) {
        (true, false) => "You have entered the page.".to_string(),
        (true, true) => "You are already viewing this page.".to_string(),
        (false, _) => format!(
            "Someone else is viewing this page. You are number {} in line.",
            outcome.position
        ),
    };
    OutboundMessage::Init {
        success: outcome.admitted,
        position: outcome.position,
        message,
    }
}

/// Admission granted after waiting.
pub fn enter_allowed(resource_id: &ResourceId) -> OutboundMessage {
    OutboundMessage::EnterAllowed {
        resource_id: resource_id.clone(),
        message: "It's your turn. You may enter now.".to_string(),
    }
}

/// Wait list position changed.
pub fn queue_update(position: usize) -> OutboundMessage {
    OutboundMessage::QueueUpdate {
        position,
        message: format!("You are number {position} in line."),
    }
}

/// Explicit leave acknowledged.
pub fn left() -> OutboundMessage {
    OutboundMessage::Left {
        message: "You have left the queue.".to_string(),
    }
}

/// Full viewer listing.
pub fn queue_list(resource_id: &ResourceId, viewers: Vec<ViewerEntry>) -> OutboundMessage {
    OutboundMessage::QueueList {
        data: QueueListData::new(resource_id.clone(), viewers),
    }
}

/// Heartbeat acknowledgement.
pub fn heartbeat_ack() -> OutboundMessage {
    OutboundMessage::Heartbeat {
        status: "ok".to_string(),
    }
}
