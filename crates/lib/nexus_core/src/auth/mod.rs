//! Authentication and authorization logic.
//!
//! Password hashing and policy, session token minting/verification, login
//! rate limiting and the session authorization check shared by the gate and
//! the handlers in `nexus_api`.

pub mod jwt;
pub mod password;
pub mod password_policy;
pub mod rate_limit;
pub mod session;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}
