//! Notification dispatcher: the [`MutationSink`] wired into the registry.
//!
//! Runs inside a queue's mutation turn, so it only serializes frames and
//! pushes them into per-session buffers with `try_send`. Socket writes
//! happen in each session's writer task. Because the push happens before
//! the queue is released, every session sees events in mutation order.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use viewgate_core::types::{ParticipantId, ResourceId};

use crate::connection::pool::ConnectionPool;
use crate::message::builder;
use crate::message::types::OutboundMessage;
use crate::metrics::QueueMetrics;
use crate::queue::admission::{Mutation, MutationSink, Notice};
use crate::queue::participant::RemovalReason;

/// Delivers queue events to sessions in the connection pool.
#[derive(Debug)]
pub struct NotificationDispatcher {
    pool: Arc<ConnectionPool>,
    metrics: Arc<QueueMetrics>,
    broadcast_queue_list: bool,
}

impl NotificationDispatcher {
    /// Creates a dispatcher over `pool`.
    pub fn new(pool: Arc<ConnectionPool>, metrics: Arc<QueueMetrics>, broadcast_queue_list: bool) -> Self {
        Self {
            pool,
            metrics,
            broadcast_queue_list,
        }
    }

    /// Serialize and queue one message for one participant.
    ///
    /// Meant for frames that carry admission state. A session that cannot
    /// take one is ended, so its close runs a `leave` instead of leaving the
    /// client with a stale view of its place.
    pub fn send_to(&self, resource_id: &ResourceId, participant_id: &ParticipantId, message: &OutboundMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(frame) => self.deliver(resource_id, participant_id, frame),
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                false
            }
        }
    }

    fn deliver(&self, resource_id: &ResourceId, participant_id: &ParticipantId, frame: String) -> bool {
        if self.pool.deliver(resource_id, participant_id, frame) {
            self.metrics.message_sent();
            return true;
        }
        self.metrics.send_failed();
        if let Some(handle) = self.pool.get(resource_id, participant_id) {
            warn!(
                conn_id = %handle.id,
                resource_id = %resource_id,
                participant_id = %participant_id,
                "Session cannot take queue events, ending it"
            );
            handle.terminate();
        }
        false
    }

    fn record(&self, resource_id: &ResourceId, mutation: &Mutation) {
        if let Some((participant_id, outcome)) = &mutation.joined {
            if !outcome.rejoined {
                self.metrics.joined(outcome.admitted);
                info!(
                    resource_id = %resource_id,
                    participant_id = %participant_id,
                    admitted = outcome.admitted,
                    position = outcome.position,
                    "Participant joined"
                );
            }
        }

        let mut left = 0;
        let mut evicted = 0;
        for removal in &mutation.removed {
            match removal.reason {
                RemovalReason::Evicted => {
                    evicted += 1;
                    warn!(
                        resource_id = %resource_id,
                        participant_id = %removal.participant.participant_id,
                        was_active = removal.was_active,
                        last_heartbeat_at = %removal.participant.last_heartbeat_at,
                        "Participant evicted after heartbeat timeout"
                    );
                }
                RemovalReason::Left | RemovalReason::Disconnected => {
                    left += 1;
                    info!(
                        resource_id = %resource_id,
                        participant_id = %removal.participant.participant_id,
                        reason = ?removal.reason,
                        "Participant left"
                    );
                }
            }
        }
        self.metrics.left(left);
        self.metrics.evicted(evicted);

        let promoted = mutation.promoted().count() as u64;
        self.metrics.promoted(promoted);
    }
}

impl MutationSink for NotificationDispatcher {
    fn publish(&self, resource_id: &ResourceId, mutation: &Mutation) {
        self.record(resource_id, mutation);

        if let Some((participant_id, outcome)) = &mutation.joined {
            self.send_to(resource_id, participant_id, &builder::init(outcome));
        }

        for removal in &mutation.removed {
            if removal.reason == RemovalReason::Evicted {
                // The channel is presumed dead; close it quietly if it lingers.
                self.pool
                    .terminate(resource_id, &removal.participant.participant_id);
            }
        }

        for notice in &mutation.notices {
            match notice {
                Notice::EnterAllowed { participant_id } => {
                    info!(
                        resource_id = %resource_id,
                        participant_id = %participant_id,
                        "Participant promoted"
                    );
                    self.send_to(resource_id, participant_id, &builder::enter_allowed(resource_id));
                }
                Notice::PositionChanged {
                    participant_id,
                    position,
                } => {
                    debug!(
                        resource_id = %resource_id,
                        participant_id = %participant_id,
                        position,
                        "Queue position changed"
                    );
                    self.send_to(resource_id, participant_id, &builder::queue_update(*position));
                }
            }
        }

        if !self.broadcast_queue_list {
            return;
        }
        let Some(viewers) = &mutation.viewers else {
            return;
        };
        let recipients: Vec<ParticipantId> = viewers.iter().map(|v| v.participant_id.clone()).collect();
        let message = builder::queue_list(resource_id, viewers.clone());
        let frame = match serde_json::to_string(&message) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "Failed to serialize queue list");
                return;
            }
        };
        for participant_id in &recipients {
            if self.pool.offer(resource_id, participant_id, frame.clone()) {
                self.metrics.message_sent();
            } else {
                debug!(
                    resource_id = %resource_id,
                    participant_id = %participant_id,
                    "Skipping queue list for busy session"
                );
            }
        }
    }
}
