//! Connection pool holding the current session for each (resource, participant).

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use viewgate_core::types::{ParticipantId, ResourceId};

use super::handle::{ConnectionHandle, ConnectionId};

type SessionKey = (ResourceId, ParticipantId);

/// Thread-safe map of live sessions.
///
/// A participant re-joining the same resource from a new session replaces
/// the old entry; only the replacing session receives queue events from
/// then on.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    by_key: DashMap<SessionKey, Arc<ConnectionHandle>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the current session for its key.
    ///
    /// Returns the session it superseded, if any.
    pub fn register(&self, handle: Arc<ConnectionHandle>) -> Option<Arc<ConnectionHandle>> {
        let key = (handle.resource_id.clone(), handle.participant_id.clone());
        self.by_key.insert(key, handle)
    }

    /// Remove the entry for `key` only if `conn_id` is still the current session.
    ///
    /// Returns whether it was.
    pub fn unregister_if_current(
        &self,
        resource_id: &ResourceId,
        participant_id: &ParticipantId,
        conn_id: &ConnectionId,
    ) -> bool {
        let key = (resource_id.clone(), participant_id.clone());
        self.by_key
            .remove_if(&key, |_, current| current.id == *conn_id)
            .is_some()
    }

    /// Gets the current session for a participant.
    pub fn get(
        &self,
        resource_id: &ResourceId,
        participant_id: &ParticipantId,
    ) -> Option<Arc<ConnectionHandle>> {
        let key = (resource_id.clone(), participant_id.clone());
        self.by_key.get(&key).map(|entry| Arc::clone(entry.value()))
    }

    /// Queue a frame for a participant's current session.
    pub fn deliver(&self, resource_id: &ResourceId, participant_id: &ParticipantId, frame: String) -> bool {
        match self.get(resource_id, participant_id) {
            Some(handle) => handle.send(frame),
            None => {
                debug!(
                    resource_id = %resource_id,
                    participant_id = %participant_id,
                    "No session to deliver to"
                );
                false
            }
        }
    }

    /// Queue a droppable frame for a participant's current session.
    ///
    /// See [`ConnectionHandle::offer`].
    pub fn offer(&self, resource_id: &ResourceId, participant_id: &ParticipantId, frame: String) -> bool {
        self.get(resource_id, participant_id)
            .is_some_and(|handle| handle.offer(frame))
    }

    /// Drop and terminate a participant's current session without sending anything.
    pub fn terminate(&self, resource_id: &ResourceId, participant_id: &ParticipantId) -> bool {
        let key = (resource_id.clone(), participant_id.clone());
        match self.by_key.remove(&key) {
            Some((_, handle)) => {
                handle.terminate();
                true
            }
            None => false,
        }
    }

    /// Terminate every session.
    pub fn close_all(&self) -> usize {
        let all: Vec<Arc<ConnectionHandle>> = self
            .by_key
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.by_key.clear();
        for handle in &all {
            handle.terminate();
        }
        all.len()
    }

    /// Number of registered sessions.
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
