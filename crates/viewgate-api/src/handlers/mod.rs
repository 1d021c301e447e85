//! Route handlers.

pub mod health;
pub mod queue;
pub mod ws;
