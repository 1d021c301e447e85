//! Convenience result type alias for Viewgate.

use crate::error::AppError;

/// A specialized `Result` type for Viewgate operations.
pub type AppResult<T> = Result<T, AppError>;
