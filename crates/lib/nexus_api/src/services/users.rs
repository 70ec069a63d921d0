//! User administration.

use chrono::Utc;
use nexus_core::auth::password::hash_password_with_cost;
use nexus_core::auth::password_policy::validate_password;
use nexus_core::models::audit::{AuditAction, ClientMeta, NewAuditEntry, TargetType};
use nexus_core::models::auth::{SessionUser, User};
use nexus_core::uuid::new_id;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{CreateUserRequest, UpdateUserRequest};

/// Reject `password` with every violated rule and its strength score.
pub(crate) fn check_policy(password: &str) -> AppResult<()> {
    let check = validate_password(password);
    if check.valid {
        Ok(())
    } else {
        Err(AppError::PasswordPolicy(check))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

pub async fn get_user(state: &AppState, id: &str) -> AppResult<User> {
    state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Create a user who must change their password on first login.
pub async fn create_user(
    state: &AppState,
    actor: &SessionUser,
    req: CreateUserRequest,
    client: &ClientMeta,
) -> AppResult<User> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(AppError::Validation(
            "Username and password are required".into(),
        ));
    }
    check_policy(&req.password)?;
    if state.store.find_user_by_username(username).await?.is_some() {
        return Err(AppError::Conflict("Username already exists".into()));
    }

    let hash = hash_password_with_cost(&req.password, state.config.bcrypt_cost)?;
    let name = non_empty(req.name);
    let user = User::new(
        new_id(),
        username,
        name.as_deref(),
        hash,
        req.is_admin,
        Some(actor.id.as_str()),
    );
    state.store.insert_user(&user).await?;

    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::UserCreated)
                .actor(&actor.id)
                .target(TargetType::User, &user.id)
                .client(client)
                .details(json!({
                    "username": user.username,
                    "name": user.name,
                    "is_admin": user.is_admin,
                })),
        )
        .await;
    info!(user_id = %user.id, actor = %actor.id, "user created");
    Ok(user)
}

/// Apply a partial update. Password changes go through the policy.
pub async fn update_user(
    state: &AppState,
    actor: &SessionUser,
    id: &str,
    req: UpdateUserRequest,
    client: &ClientMeta,
) -> AppResult<User> {
    let mut user = get_user(state, id).await?;
    let mut changes = Map::new();

    if let Some(name) = req.name {
        user.name = non_empty(Some(name));
        changes.insert("name".into(), json!(user.name));
    }
    if let Some(password) = req.password {
        check_policy(&password)?;
        user.password_hash = hash_password_with_cost(&password, state.config.bcrypt_cost)?;
        changes.insert("password".into(), json!("***changed***"));
    }
    if let Some(is_admin) = req.is_admin {
        user.is_admin = is_admin;
        changes.insert("is_admin".into(), json!(is_admin));
    }
    if let Some(is_active) = req.is_active {
        user.is_active = is_active;
        changes.insert("is_active".into(), json!(is_active));
    }
    if let Some(must_change) = req.must_change_password {
        user.must_change_password = must_change;
        changes.insert("must_change_password".into(), json!(must_change));
    }
    if changes.is_empty() {
        return Err(AppError::Validation("No updates provided".into()));
    }

    user.updated_at = Utc::now();
    if !state.store.update_user(&user).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::UserUpdated)
                .actor(&actor.id)
                .target(TargetType::User, id)
                .client(client)
                .details(Value::Object(changes)),
        )
        .await;
    Ok(user)
}

/// Delete a user and their grants. Admins cannot delete themselves.
pub async fn delete_user(
    state: &AppState,
    actor: &SessionUser,
    id: &str,
    client: &ClientMeta,
) -> AppResult<()> {
    if id == actor.id {
        return Err(AppError::Validation(
            "Cannot delete your own account".into(),
        ));
    }
    let user = get_user(state, id).await?;
    if !state.store.delete_user(id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::UserDeleted)
                .actor(&actor.id)
                .target(TargetType::User, id)
                .client(client)
                .details(json!({ "username": user.username })),
        )
        .await;
    info!(user_id = %id, actor = %actor.id, "user deleted");
    Ok(())
}
