//! Request handlers.

pub mod access;
pub mod apps;
pub mod audit;
pub mod auth;
pub mod settings;
pub mod users;

use crate::error::AppError;

/// Fallback for unmatched routes that made it past the gate.
pub async fn not_found_handler() -> AppError {
    AppError::NotFound("Route not found".into())
}
