//! Participant records owned by an admission queue.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use viewgate_core::types::{ParticipantId, ResourceId};

/// Lifecycle state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    /// Queued behind the occupant slots.
    Waiting,
    /// Holding an occupant slot.
    Active,
    /// Gone. Terminal.
    Removed,
}

/// Why a participant left its queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Explicit `leave` command.
    Left,
    /// Transport closed without a `leave`.
    Disconnected,
    /// Heartbeat deadline passed.
    Evicted,
}

/// A session attempting to view a resource.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Participant identity supplied by the caller.
    pub participant_id: ParticipantId,
    /// Resource the participant queued for.
    pub resource_id: ResourceId,
    /// Arrival time at the queue.
    pub joined_at: DateTime<Utc>,
    /// Last liveness signal.
    pub last_heartbeat_at: DateTime<Utc>,
    /// Current state.
    pub state: ParticipantState,
}

impl Participant {
    /// Create a participant arriving at `now`.
    pub fn new(
        resource_id: ResourceId,
        participant_id: ParticipantId,
        state: ParticipantState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            participant_id,
            resource_id,
            joined_at: now,
            last_heartbeat_at: now,
            state,
        }
    }

    /// Record a liveness signal.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_heartbeat_at {
            self.last_heartbeat_at = now;
        }
    }

    /// Whether the participant has been silent for longer than `timeout`.
    pub fn is_stale(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_heartbeat_at > timeout
    }
}

/// Display status of a viewer in a queue listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerStatus {
    /// Occupant.
    Viewing,
    /// In the wait list.
    Waiting,
}

/// One row of a queue listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerEntry {
    /// Participant id.
    pub participant_id: ParticipantId,
    /// Arrival time.
    pub joined_at: DateTime<Utc>,
    /// 0 for occupants, 1-based for waiters.
    pub position: usize,
    /// Viewing or waiting.
    pub status: ViewerStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(now: DateTime<Utc>) -> Participant {
        Participant::new(
            ResourceId::parse("lot-1", 64).unwrap(),
            ParticipantId::parse("alice", 64).unwrap(),
            ParticipantState::Waiting,
            now,
        )
    }

    #[test]
    fn test_stale_only_past_deadline() {
        let start = Utc::now();
        let p = participant(start);
        let timeout = Duration::seconds(30);
        assert!(!p.is_stale(start + Duration::seconds(30), timeout));
        assert!(p.is_stale(start + Duration::seconds(31), timeout));
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let start = Utc::now();
        let mut p = participant(start);
        p.touch(start - Duration::seconds(5));
        assert_eq!(p.last_heartbeat_at, start);
        p.touch(start + Duration::seconds(5));
        assert_eq!(p.last_heartbeat_at, start + Duration::seconds(5));
    }
}
