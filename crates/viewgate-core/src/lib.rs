//! # viewgate-core
//!
//! Core crate for Viewgate. Contains configuration schemas, validated
//! identifier types, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Viewgate crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
