//! Application error types.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use nexus_core::access::AccessError;
use nexus_core::auth::AuthError;
use nexus_core::auth::password_policy::{PasswordCheck, strength_label};
use nexus_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::{ErrorResponse, PasswordStrength};

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Password rejected by the policy; every violated rule is reported.
    #[error("Password does not meet complexity requirements")]
    PasswordPolicy(PasswordCheck),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Session is valid but a password change is pending.
    #[error("Password change required")]
    PasswordChangeRequired,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: i64 },

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message, details) = match self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m, None),
            AppError::PasswordPolicy(check) => {
                let body = Json(ErrorResponse {
                    error: "password_policy".to_string(),
                    message: "Password does not meet complexity requirements".to_string(),
                    details: Some(check.errors),
                    strength: Some(PasswordStrength {
                        score: check.strength,
                        label: strength_label(check.strength).to_string(),
                    }),
                });
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m, None),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m, None),
            AppError::PasswordChangeRequired => (
                StatusCode::FORBIDDEN,
                "password_change_required",
                "Password change required".to_string(),
                None,
            ),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m, None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m, None),
            AppError::TooManyRequests { retry_after_secs } => {
                let body = Json(ErrorResponse {
                    error: "rate_limited".to_string(),
                    message: format!(
                        "Too many login attempts. Try again in {retry_after_secs} seconds."
                    ),
                    details: None,
                    strength: None,
                });
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                    response.headers_mut().insert(RETRY_AFTER, value);
                }
                return response;
            }
            AppError::Internal(m) => {
                error!("internal error: {m}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                    None,
                )
            }
        };
        let body = Json(ErrorResponse {
            error: kind.to_string(),
            message,
            details,
            strength: None,
        });
        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::MissingReference(msg) => AppError::NotFound(msg),
            StoreError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::TokenError(msg) => AppError::Internal(msg),
            AuthError::Store(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<AccessError> for AppError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            AccessError::Store(e) => AppError::from(e),
        }
    }
}
