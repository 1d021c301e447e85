//! Individual WebSocket session handle.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use viewgate_core::types::{ParticipantId, ResourceId};

/// Unique connection identifier
pub type ConnectionId = Uuid;

/// A handle to a single queue session.
///
/// Holds the sender for pushing serialized frames to the client's writer
/// task, plus the cancellation token that ends the session's loops.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// Resource the session is queued for
    pub resource_id: ResourceId,
    /// Participant that owns the session
    pub participant_id: ParticipantId,
    /// Sender for outbound frames
    sender: mpsc::Sender<String>,
    /// When the session was established
    pub connected_at: DateTime<Utc>,
    /// Fired when the server ends the session
    cancel: CancellationToken,
    /// Whether the outbound side is still usable
    alive: AtomicBool,
}

impl ConnectionHandle {
    /// Create a new connection handle
    pub fn new(
        resource_id: ResourceId,
        participant_id: ParticipantId,
        sender: mpsc::Sender<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id,
            participant_id,
            sender,
            connected_at: Utc::now(),
            cancel: CancellationToken::new(),
            alive: AtomicBool::new(true),
        }
    }

    /// Queue a frame for this connection without waiting.
    ///
    /// Returns `false` when the buffer is full or the writer is gone; the
    /// frame is dropped in both cases.
    pub fn send(&self, frame: String) -> bool {
        if !self.is_alive() {
            return false;
        }
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, "Connection send buffer full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.mark_dead();
                false
            }
        }
    }

    /// Queue a frame the client can live without.
    ///
    /// Refuses once only a quarter of the buffer is left, keeping that room
    /// for `init`, `enter_allowed` and `queue_update`.
    pub fn offer(&self, frame: String) -> bool {
        let reserved = (self.sender.max_capacity() / 4).max(1);
        if self.sender.capacity() <= reserved {
            return false;
        }
        self.send(frame)
    }

    /// Check if connection is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Mark connection as dead
    pub fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    /// End the session from the server side. No frame is sent.
    pub fn terminate(&self) {
        self.mark_dead();
        self.cancel.cancel();
    }

    /// Token cancelled by [`terminate`](Self::terminate).
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(buffer: usize) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer);
        let handle = ConnectionHandle::new(
            ResourceId::parse("lot-1", 64).unwrap(),
            ParticipantId::parse("alice", 64).unwrap(),
            tx,
        );
        (handle, rx)
    }

    #[tokio::test]
    async fn test_send_delivers() {
        let (handle, mut rx) = handle(4);
        assert!(handle.send("hello".into()));
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn test_full_buffer_drops() {
        let (handle, _rx) = handle(1);
        assert!(handle.send("one".into()));
        assert!(!handle.send("two".into()));
        assert!(handle.is_alive());
    }

    #[test]
    fn test_offer_leaves_reserved_room() {
        let (handle, _rx) = handle(4);
        assert!(handle.offer("one".into()));
        assert!(handle.offer("two".into()));
        assert!(!handle.offer("three".into()));
        assert!(handle.send("required".into()));
        assert!(!handle.send("overflow".into()));
    }

    #[test]
    fn test_closed_receiver_marks_dead() {
        let (handle, rx) = handle(1);
        drop(rx);
        assert!(!handle.send("lost".into()));
        assert!(!handle.is_alive());
    }

    #[test]
    fn test_terminate_cancels() {
        let (handle, _rx) = handle(1);
        let token = handle.cancelled();
        handle.terminate();
        assert!(token.is_cancelled());
        assert!(!handle.send("late".into()));
    }
}
