//! Lock-free-for-readers status board.
//!
//! Each queue publishes its occupancy summary here at the end of every
//! mutation turn. Readers never touch a queue lock, so the board is
//! eventually consistent with the true queue state.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use viewgate_core::types::{ParticipantId, ResourceId};

/// Occupancy of one resource, as returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Resource id.
    pub resource_id: ResourceId,
    /// Whether any occupant slot is taken.
    pub is_occupied: bool,
    /// Number of waiters.
    pub queue_length: usize,
    /// Earliest-admitted occupant.
    pub current_occupant_id: Option<ParticipantId>,
    /// Waiters in order.
    pub waiting_participants: Vec<ParticipantId>,
}

impl QueueStatus {
    /// Status of a resource nobody is queued for.
    pub fn vacant(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            is_occupied: false,
            queue_length: 0,
            current_occupant_id: None,
            waiting_participants: Vec::new(),
        }
    }
}

/// Compact per-resource entry for the all-queues listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSummary {
    /// Resource id.
    pub resource_id: ResourceId,
    /// Whether any occupant slot is taken.
    pub is_occupied: bool,
    /// Number of waiters.
    pub queue_length: usize,
}

impl From<&QueueStatus> for QueueSummary {
    fn from(status: &QueueStatus) -> Self {
        Self {
            resource_id: status.resource_id.clone(),
            is_occupied: status.is_occupied,
            queue_length: status.queue_length,
        }
    }
}

/// Published queue summaries keyed by resource.
#[derive(Debug, Default)]
pub struct StatusBoard {
    entries: DashMap<ResourceId, QueueStatus>,
}

impl StatusBoard {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published status of a resource.
    pub fn publish(&self, status: QueueStatus) {
        self.entries.insert(status.resource_id.clone(), status);
    }

    /// Drop a resource from the board.
    pub fn remove(&self, resource_id: &ResourceId) {
        self.entries.remove(resource_id);
    }

    /// Last published status, or a vacant one for unknown resources.
    pub fn get(&self, resource_id: &ResourceId) -> QueueStatus {
        self.entries
            .get(resource_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| QueueStatus::vacant(resource_id.clone()))
    }

    /// Summaries of every published resource, sorted by id.
    pub fn summaries(&self) -> Vec<QueueSummary> {
        let mut all: Vec<QueueSummary> = self
            .entries
            .iter()
            .map(|entry| QueueSummary::from(entry.value()))
            .collect();
        all.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));
        all
    }

    /// Number of published resources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is published.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(raw: &str) -> ResourceId {
        ResourceId::parse(raw, 64).unwrap()
    }

    #[test]
    fn test_unknown_resource_is_vacant() {
        let board = StatusBoard::new();
        let status = board.get(&rid("lot-1"));
        assert!(!status.is_occupied);
        assert_eq!(status.queue_length, 0);
        assert!(status.current_occupant_id.is_none());
    }

    #[test]
    fn test_status_serializes_null_occupant() {
        let json = serde_json::to_value(QueueStatus::vacant(rid("lot-1"))).unwrap();
        assert_eq!(json["is_occupied"], false);
        assert_eq!(json["queue_length"], 0);
        assert!(json["current_occupant_id"].is_null());
    }

    #[test]
    fn test_summaries_sorted() {
        let board = StatusBoard::new();
        board.publish(QueueStatus::vacant(rid("b")));
        board.publish(QueueStatus::vacant(rid("a")));
        let ids: Vec<_> = board
            .summaries()
            .into_iter()
            .map(|s| s.resource_id.into_inner())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        board.remove(&rid("a"));
        assert_eq!(board.len(), 1);
    }
}
