//! # viewgate-api
//!
//! HTTP API layer for Viewgate built on Axum.
//!
//! Provides the WebSocket queue session endpoint, the queue status and
//! health endpoints, middleware (CORS, request logging), DTOs, and error
//! mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use state::AppState;
