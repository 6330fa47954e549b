//! Convenience result type alias for Stint.

use crate::error::AppError;

/// A specialized `Result` type for Stint operations.
pub type AppResult<T> = Result<T, AppError>;
