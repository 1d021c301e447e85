//! WebSocket message types, serialization, and validation.

pub mod builder;
pub mod types;
pub mod validator;

pub use types::{InboundMessage, OutboundMessage, QueueListData};
