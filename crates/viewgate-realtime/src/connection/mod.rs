//! Per-participant sessions: handles with outbound buffers, and the pool that routes to them.

pub mod handle;
pub mod pool;

pub use handle::{ConnectionHandle, ConnectionId};
pub use pool::ConnectionPool;
