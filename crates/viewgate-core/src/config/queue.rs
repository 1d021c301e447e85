//! Admission queue and liveness configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::id::DEFAULT_MAX_ID_LENGTH;

/// Admission queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Concurrent occupants allowed per resource.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Heartbeat cadence expected from clients, in seconds.
    ///
    /// Not sent to clients; only checked against `heartbeat_timeout_seconds`.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Silence after which a participant is evicted, in seconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_seconds: u64,
    /// Liveness monitor tick, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Outbound buffer per session.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// Push the full viewer list to every member after each membership change.
    #[serde(default = "default_true")]
    pub broadcast_queue_list: bool,
    /// Maximum participant id length in bytes.
    #[serde(default = "default_max_id_length")]
    pub max_participant_id_length: usize,
    /// Maximum resource id length in bytes.
    #[serde(default = "default_max_id_length")]
    pub max_resource_id_length: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            heartbeat_timeout_seconds: default_heartbeat_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
            channel_buffer_size: default_channel_buffer(),
            broadcast_queue_list: true,
            max_participant_id_length: default_max_id_length(),
            max_resource_id_length: default_max_id_length(),
        }
    }
}

impl QueueConfig {
    /// Silence tolerated before eviction.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    /// Liveness monitor tick.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    /// Reject values the queue cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.capacity == 0 {
            return Err(AppError::configuration("queue.capacity must be at least 1"));
        }
        if self.heartbeat_timeout_seconds == 0 {
            return Err(AppError::configuration(
                "queue.heartbeat_timeout_seconds must be positive",
            ));
        }
        if self.sweep_interval_seconds == 0 {
            return Err(AppError::configuration(
                "queue.sweep_interval_seconds must be positive",
            ));
        }
        if self.channel_buffer_size == 0 {
            return Err(AppError::configuration(
                "queue.channel_buffer_size must be positive",
            ));
        }
        if self.heartbeat_timeout_seconds <= self.heartbeat_interval_seconds {
            tracing::warn!(
                interval = self.heartbeat_interval_seconds,
                timeout = self.heartbeat_timeout_seconds,
                "Heartbeat timeout does not exceed the heartbeat interval; live clients may be evicted"
            );
        }
        Ok(())
    }
}

fn default_capacity() -> usize {
    1
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_heartbeat_timeout() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_channel_buffer() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_max_id_length() -> usize {
    DEFAULT_MAX_ID_LENGTH
}
