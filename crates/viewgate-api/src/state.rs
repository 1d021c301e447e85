//! Application state shared across all handlers and middleware.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use viewgate_core::config::AppConfig;
use viewgate_realtime::QueueEngine;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Admission queue engine
    pub engine: QueueEngine,
    /// When the process started serving
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Creates state around an already-built engine.
    pub fn new(config: AppConfig, engine: QueueEngine) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            started_at: Utc::now(),
        }
    }

    /// Seconds since [`started_at`](Self::started_at).
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }
}
