//! Turns queue mutations into frames for the affected sessions.

pub mod dispatcher;

pub use dispatcher::NotificationDispatcher;
