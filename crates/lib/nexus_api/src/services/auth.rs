//! Login, logout and password-change flows.
//!
//! These compose the rate limiter, password hashing and policy, the access
//! grant service, the token service and the audit recorder into the three
//! credential-bearing operations.

use chrono::Utc;
use nexus_core::auth::password::{hash_password_with_cost, verify_password};
use nexus_core::models::audit::{AuditAction, ClientMeta, NewAuditEntry};
use nexus_core::models::auth::{SessionUser, User};
use serde_json::json;
use tracing::{debug, info, warn};

use super::users::check_policy;
use crate::AppState;
use crate::error::{AppError, AppResult};

/// Freshly minted token plus the session it encodes.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    pub token: String,
    pub session: SessionUser,
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

/// bcrypt comparison where an unreadable stored hash counts as a mismatch.
fn password_matches(password: &str, hash: &str, user_id: &str) -> bool {
    match verify_password(password, hash) {
        Ok(matches) => matches,
        Err(e) => {
            warn!(user_id, error = %e, "stored password hash is unreadable");
            false
        }
    }
}

/// Mint a token for `user` with its live authorized app slugs.
///
/// Disabled accounts never get a token.
pub async fn mint_session(state: &AppState, user: &User) -> AppResult<SessionGrant> {
    if !user.is_active {
        return Err(invalid_credentials());
    }
    let apps = state.grants.authorized_app_slugs(&user.id).await?;
    let session = SessionUser::from_user(user, apps);
    let token = state.tokens.mint(&session)?;
    Ok(SessionGrant { token, session })
}

/// Authenticate `username` / `password` coming from `client`.
///
/// The rate limit is checked before the store is touched. Unknown user,
/// disabled account and wrong password all answer the same 401; only the
/// audit entry tells them apart.
pub async fn login(
    state: &AppState,
    username: &str,
    password: &str,
    client: &ClientMeta,
) -> AppResult<SessionGrant> {
    let key = client.rate_limit_key();
    let decision = state.rate_limiter.check(&key, &state.config.login_limit);
    if !decision.allowed {
        let retry_after_secs = decision.retry_after_secs(Utc::now());
        warn!(client = %key, retry_after_secs, "login rate limit exceeded");
        return Err(AppError::TooManyRequests { retry_after_secs });
    }

    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required".into(),
        ));
    }

    let Some(user) = state.store.find_user_by_username(username).await? else {
        let _ = verify_password(password, &state.dummy_hash);
        state
            .audit
            .record(
                NewAuditEntry::new(AuditAction::LoginFailed)
                    .client(client)
                    .details(json!({ "username": username, "reason": "User not found" })),
            )
            .await;
        debug!(username, "login failed: unknown user");
        return Err(invalid_credentials());
    };

    let password_ok = password_matches(password, &user.password_hash, &user.id);
    let reason = if !user.is_active {
        Some("Account disabled")
    } else if !password_ok {
        Some("Invalid password")
    } else {
        None
    };
    if let Some(reason) = reason {
        state
            .audit
            .record(
                NewAuditEntry::new(AuditAction::LoginFailed)
                    .actor(&user.id)
                    .client(client)
                    .details(json!({ "reason": reason })),
            )
            .await;
        debug!(user_id = %user.id, reason, "login failed");
        return Err(invalid_credentials());
    }

    state.rate_limiter.reset(&key);
    let grant = mint_session(state, &user).await?;
    state.store.record_login(&user.id, Utc::now()).await?;
    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::Login)
                .actor(&user.id)
                .client(client),
        )
        .await;
    info!(user_id = %user.id, apps = grant.session.apps.len(), "login succeeded");
    Ok(grant)
}

/// Record a logout for `session`, if there is one. Never fails.
pub async fn logout(state: &AppState, session: Option<&SessionUser>, client: &ClientMeta) {
    if let Some(session) = session {
        state
            .audit
            .record(
                NewAuditEntry::new(AuditAction::Logout)
                    .actor(&session.id)
                    .client(client),
            )
            .await;
        info!(user_id = %session.id, "logout");
    }
}

/// Rotate the caller's password and re-mint their token.
///
/// A disabled account is refused like a wrong password. The current password
/// is checked first (401 when wrong), then the new one against the policy
/// (400 with every violation).
pub async fn change_password(
    state: &AppState,
    session: &SessionUser,
    current_password: &str,
    new_password: &str,
    client: &ClientMeta,
) -> AppResult<SessionGrant> {
    if current_password.is_empty() || new_password.is_empty() {
        return Err(AppError::Validation(
            "Current password and new password are required".into(),
        ));
    }

    let mut user = state
        .store
        .get_user(&session.id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if !user.is_active {
        state
            .audit
            .record(
                NewAuditEntry::new(AuditAction::LoginFailed)
                    .actor(&user.id)
                    .client(client)
                    .details(json!({
                        "reason": "Account disabled",
                        "during": "password_change",
                    })),
            )
            .await;
        debug!(user_id = %user.id, "password change rejected: account disabled");
        return Err(invalid_credentials());
    }

    if !password_matches(current_password, &user.password_hash, &user.id) {
        debug!(user_id = %user.id, "password change rejected: wrong current password");
        return Err(AppError::Unauthorized(
            "Current password is incorrect".into(),
        ));
    }

    check_policy(new_password)?;

    let hash = hash_password_with_cost(new_password, state.config.bcrypt_cost)?;
    state.store.set_password(&user.id, &hash, false).await?;
    user.password_hash = hash;
    user.must_change_password = false;

    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::PasswordChanged)
                .actor(&user.id)
                .client(client),
        )
        .await;
    info!(user_id = %user.id, "password changed");

    mint_session(state, &user).await
}
