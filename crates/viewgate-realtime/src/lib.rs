//! # viewgate-realtime
//!
//! Viewer admission engine for Viewgate. Provides:
//!
//! - Per-resource admission queues (N occupant slots + FIFO wait list)
//! - A registry that creates queues lazily and drops them once empty
//! - A liveness monitor that evicts participants whose heartbeats stop
//! - Per-session connection handles with bounded outbound buffers
//! - Wire message types and inbound frame validation
//! - A status board readable without touching any queue lock

pub mod connection;
pub mod engine;
pub mod message;
pub mod metrics;
pub mod notification;
pub mod queue;

pub use connection::pool::ConnectionPool;
pub use engine::QueueEngine;
pub use notification::dispatcher::NotificationDispatcher;
pub use queue::monitor::LivenessMonitor;
pub use queue::registry::QueueRegistry;
