//! Response DTOs.

use serde::{Deserialize, Serialize};

use viewgate_realtime::metrics::MetricsSnapshot;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
}

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedHealthResponse {
    /// Overall status.
    pub status: String,
    /// Version.
    pub version: String,
    /// Uptime.
    pub uptime_seconds: u64,
    /// Live admission queues.
    pub queues: usize,
    /// Open WebSocket sessions.
    pub sessions: usize,
    /// Engine counters.
    pub metrics: MetricsSnapshot,
}
