//! Queue engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level counters.
#[derive(Debug, Default)]
pub struct QueueMetrics {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    joins: AtomicU64,
    admissions: AtomicU64,
    promotions: AtomicU64,
    leaves: AtomicU64,
    evictions: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    send_failures: AtomicU64,
    malformed_frames: AtomicU64,
}

impl QueueMetrics {
    /// Create new zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// A session was accepted.
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// A session ended.
    pub fn session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// A join was processed; `admitted` if it took a slot immediately.
    pub fn joined(&self, admitted: bool) {
        self.joins.fetch_add(1, Ordering::Relaxed);
        if admitted {
            self.admissions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Waiters promoted into a slot.
    pub fn promoted(&self, count: u64) {
        self.promotions.fetch_add(count, Ordering::Relaxed);
    }

    /// Participants removed by leave or disconnect.
    pub fn left(&self, count: u64) {
        self.leaves.fetch_add(count, Ordering::Relaxed);
    }

    /// Participants removed by the liveness monitor.
    pub fn evicted(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    /// An outbound message was queued for a session.
    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound frame was accepted.
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// An outbound message could not be queued.
    pub fn send_failed(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An inbound frame was dropped as malformed.
    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let opened = self.sessions_opened.load(Ordering::Relaxed);
        let closed = self.sessions_closed.load(Ordering::Relaxed);
        MetricsSnapshot {
            sessions_opened: opened,
            sessions_active: opened.saturating_sub(closed),
            joins: self.joins.load(Ordering::Relaxed),
            admissions: self.admissions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            leaves: self.leaves.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Sessions ever accepted.
    pub sessions_opened: u64,
    /// Sessions currently open.
    pub sessions_active: u64,
    /// Joins processed.
    pub joins: u64,
    /// Joins admitted immediately.
    pub admissions: u64,
    /// Waiters promoted.
    pub promotions: u64,
    /// Voluntary leaves and disconnects.
    pub leaves: u64,
    /// Liveness evictions.
    pub evictions: u64,
    /// Outbound messages queued.
    pub messages_sent: u64,
    /// Inbound frames accepted.
    pub messages_received: u64,
    /// Outbound messages dropped.
    pub send_failures: u64,
    /// Inbound frames dropped as malformed.
    pub malformed_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_sessions() {
        let metrics = QueueMetrics::new();
        metrics.session_opened();
        metrics.session_opened();
        metrics.session_closed();
        metrics.joined(true);
        metrics.joined(false);
        let snap = metrics.snapshot();
        assert_eq!(snap.sessions_active, 1);
        assert_eq!(snap.joins, 2);
        assert_eq!(snap.admissions, 1);
    }
}
