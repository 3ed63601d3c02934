//! Convenience result type alias for BillHub.

use crate::error::AppError;

/// A specialized `Result` type for BillHub operations.
pub type AppResult<T> = Result<T, AppError>;
