//! Per-resource admission queue: `capacity` occupant slots plus a FIFO wait list.
//!
//! The queue is a plain synchronous state machine. Callers serialize access
//! to it (see [`QueueRegistry`](super::registry::QueueRegistry)); every
//! mutating call returns a [`Mutation`] describing who must be told what,
//! so delivery never happens from inside the state machine.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use viewgate_core::types::{ParticipantId, ResourceId};

use super::participant::{Participant, ParticipantState, RemovalReason, ViewerEntry, ViewerStatus};
use super::status::QueueStatus;

/// Result of a `join`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    /// Whether the participant holds an occupant slot.
    pub admitted: bool,
    /// 0 when admitted, otherwise the 1-based wait list position.
    pub position: usize,
    /// The participant was already present; nothing changed.
    pub rejoined: bool,
}

/// A message the queue wants delivered to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The participant was promoted into an occupant slot.
    EnterAllowed {
        /// Promoted participant.
        participant_id: ParticipantId,
    },
    /// The participant's wait list position changed.
    PositionChanged {
        /// Affected waiter.
        participant_id: ParticipantId,
        /// New 1-based position.
        position: usize,
    },
}

/// A participant taken out of the queue by a mutation.
#[derive(Debug, Clone)]
pub struct Removal {
    /// The participant record, in state `Removed`.
    pub participant: Participant,
    /// Why it was removed.
    pub reason: RemovalReason,
    /// Whether it held an occupant slot.
    pub was_active: bool,
}

/// Everything a single serialized mutation produced.
///
/// Computed while the queue is locked, delivered by a [`MutationSink`].
#[derive(Debug, Clone, Default)]
pub struct Mutation {
    /// The joining participant and its outcome, for `join`.
    pub joined: Option<(ParticipantId, JoinOutcome)>,
    /// Participants removed by this mutation.
    pub removed: Vec<Removal>,
    /// Per-participant notices, promotions first.
    pub notices: Vec<Notice>,
    /// Full listing after the change; `Some` only when membership changed.
    pub viewers: Option<Vec<ViewerEntry>>,
}

impl Mutation {
    /// True when nothing needs to be delivered.
    pub fn is_noop(&self) -> bool {
        self.joined.is_none()
            && self.removed.is_empty()
            && self.notices.is_empty()
            && self.viewers.is_none()
    }

    /// Participants promoted by this mutation.
    pub fn promoted(&self) -> impl Iterator<Item = &ParticipantId> {
        self.notices.iter().filter_map(|n| match n {
            Notice::EnterAllowed { participant_id } => Some(participant_id),
            Notice::PositionChanged { .. } => None,
        })
    }
}

/// Receives mutations while the owning queue is still locked.
///
/// Implementations must not block: they run inside the queue's single
/// mutation point, so anything slow here stalls that resource.
pub trait MutationSink: Send + Sync {
    /// Deliver the effects of one mutation on `resource_id`.
    fn publish(&self, resource_id: &ResourceId, mutation: &Mutation);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MutationSink for NullSink {
    fn publish(&self, _resource_id: &ResourceId, _mutation: &Mutation) {}
}

/// Admission state for one resource.
#[derive(Debug)]
pub struct AdmissionQueue {
    resource_id: ResourceId,
    capacity: usize,
    occupants: Vec<Participant>,
    wait_list: VecDeque<Participant>,
    retired: bool,
}

impl AdmissionQueue {
    /// Create an empty queue. A zero capacity is raised to 1.
    pub fn new(resource_id: ResourceId, capacity: usize) -> Self {
        Self {
            resource_id,
            capacity: capacity.max(1),
            occupants: Vec::new(),
            wait_list: VecDeque::new(),
            retired: false,
        }
    }

    /// Resource this queue guards.
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// Occupant slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Admit `participant_id` or append it to the wait list.
    ///
    /// Re-joining with an id already present refreshes its heartbeat and
    /// reports its current status without moving it.
    pub fn join(&mut self, participant_id: ParticipantId, now: DateTime<Utc>) -> Mutation {
        if let Some(occupant) = self
            .occupants
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
        {
            occupant.touch(now);
            return Mutation {
                joined: Some((
                    participant_id,
                    JoinOutcome {
                        admitted: true,
                        position: 0,
                        rejoined: true,
                    },
                )),
                ..Mutation::default()
            };
        }

        if let Some(index) = self
            .wait_list
            .iter()
            .position(|p| p.participant_id == participant_id)
        {
            self.wait_list[index].touch(now);
            return Mutation {
                joined: Some((
                    participant_id,
                    JoinOutcome {
                        admitted: false,
                        position: index + 1,
                        rejoined: true,
                    },
                )),
                ..Mutation::default()
            };
        }

        let outcome = if self.has_free_slot() && self.wait_list.is_empty() {
            self.occupants.push(Participant::new(
                self.resource_id.clone(),
                participant_id.clone(),
                ParticipantState::Active,
                now,
            ));
            JoinOutcome {
                admitted: true,
                position: 0,
                rejoined: false,
            }
        } else {
            self.wait_list.push_back(Participant::new(
                self.resource_id.clone(),
                participant_id.clone(),
                ParticipantState::Waiting,
                now,
            ));
            JoinOutcome {
                admitted: false,
                position: self.wait_list.len(),
                rejoined: false,
            }
        };

        Mutation {
            joined: Some((participant_id, outcome)),
            viewers: Some(self.viewers()),
            ..Mutation::default()
        }
    }

    /// Voluntary departure. Unknown ids are a no-op.
    pub fn leave(&mut self, participant_id: &ParticipantId, reason: RemovalReason) -> Mutation {
        self.remove_where(|p| p.participant_id == *participant_id, reason)
    }

    /// Removal by the liveness monitor; identical to `leave` apart from the reason.
    pub fn evict(&mut self, participant_id: &ParticipantId) -> Mutation {
        self.leave(participant_id, RemovalReason::Evicted)
    }

    /// Evict every participant silent for longer than `timeout`, in one turn.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, timeout: Duration) -> Mutation {
        self.remove_where(|p| p.is_stale(now, timeout), RemovalReason::Evicted)
    }

    /// Refresh a participant's liveness. Returns whether it is present.
    pub fn heartbeat(&mut self, participant_id: &ParticipantId, now: DateTime<Utc>) -> bool {
        match self.find_mut(participant_id) {
            Some(p) => {
                p.touch(now);
                true
            }
            None => false,
        }
    }

    /// 0 for occupants, 1-based for waiters, `None` if absent.
    pub fn position_of(&self, participant_id: &ParticipantId) -> Option<usize> {
        if self
            .occupants
            .iter()
            .any(|p| p.participant_id == *participant_id)
        {
            return Some(0);
        }
        self.wait_list
            .iter()
            .position(|p| p.participant_id == *participant_id)
            .map(|i| i + 1)
    }

    /// Occupants first, then waiters in arrival order.
    pub fn viewers(&self) -> Vec<ViewerEntry> {
        let occupants = self.occupants.iter().map(|p| ViewerEntry {
            participant_id: p.participant_id.clone(),
            joined_at: p.joined_at,
            position: 0,
            status: ViewerStatus::Viewing,
        });
        let waiters = self.wait_list.iter().enumerate().map(|(i, p)| ViewerEntry {
            participant_id: p.participant_id.clone(),
            joined_at: p.joined_at,
            position: i + 1,
            status: ViewerStatus::Waiting,
        });
        occupants.chain(waiters).collect()
    }

    /// Occupancy summary for the status board.
    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            resource_id: self.resource_id.clone(),
            is_occupied: !self.occupants.is_empty(),
            queue_length: self.wait_list.len(),
            current_occupant_id: self.occupants.first().map(|p| p.participant_id.clone()),
            waiting_participants: self
                .wait_list
                .iter()
                .map(|p| p.participant_id.clone())
                .collect(),
        }
    }

    /// Occupant records.
    pub fn occupants(&self) -> &[Participant] {
        &self.occupants
    }

    /// Number of waiters.
    pub fn waiting_len(&self) -> usize {
        self.wait_list.len()
    }

    /// No occupants and no waiters.
    pub fn is_empty(&self) -> bool {
        self.occupants.is_empty() && self.wait_list.is_empty()
    }

    /// Whether the registry has detached this queue.
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Mark the queue as detached from the registry. Only valid when empty.
    pub(crate) fn retire(&mut self) -> bool {
        if self.is_empty() {
            self.retired = true;
        }
        self.retired
    }

    fn has_free_slot(&self) -> bool {
        self.occupants.len() < self.capacity
    }

    fn find_mut(&mut self, participant_id: &ParticipantId) -> Option<&mut Participant> {
        if let Some(p) = self
            .occupants
            .iter_mut()
            .find(|p| p.participant_id == *participant_id)
        {
            return Some(p);
        }
        self.wait_list
            .iter_mut()
            .find(|p| p.participant_id == *participant_id)
    }

    /// Remove every participant matching `pred`, refill free slots from the
    /// head of the wait list, and report position changes for the waiters
    /// that remain.
    fn remove_where<F>(&mut self, pred: F, reason: RemovalReason) -> Mutation
    where
        F: Fn(&Participant) -> bool,
    {
        let before: HashMap<ParticipantId, usize> = self
            .wait_list
            .iter()
            .enumerate()
            .map(|(i, p)| (p.participant_id.clone(), i + 1))
            .collect();

        let mut removed = Vec::new();

        let mut kept = Vec::with_capacity(self.occupants.len());
        for mut p in self.occupants.drain(..) {
            if pred(&p) {
                p.state = ParticipantState::Removed;
                removed.push(Removal {
                    participant: p,
                    reason,
                    was_active: true,
                });
            } else {
                kept.push(p);
            }
        }
        self.occupants = kept;

        let mut waiting = VecDeque::with_capacity(self.wait_list.len());
        for mut p in self.wait_list.drain(..) {
            if pred(&p) {
                p.state = ParticipantState::Removed;
                removed.push(Removal {
                    participant: p,
                    reason,
                    was_active: false,
                });
            } else {
                waiting.push_back(p);
            }
        }
        self.wait_list = waiting;

        if removed.is_empty() {
            return Mutation::default();
        }

        let mut notices = self.promote();

        for (i, p) in self.wait_list.iter().enumerate() {
            let position = i + 1;
            if before.get(&p.participant_id) != Some(&position) {
                notices.push(Notice::PositionChanged {
                    participant_id: p.participant_id.clone(),
                    position,
                });
            }
        }

        Mutation {
            joined: None,
            removed,
            notices,
            viewers: Some(self.viewers()),
        }
    }

    /// Move waiters into free occupant slots, oldest first.
    fn promote(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while self.has_free_slot() {
            let Some(mut next) = self.wait_list.pop_front() else {
                break;
            };
            next.state = ParticipantState::Active;
            notices.push(Notice::EnterAllowed {
                participant_id: next.participant_id.clone(),
            });
            self.occupants.push(next);
        }
        notices
    }
}
