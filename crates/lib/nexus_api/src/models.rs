//! Request and response bodies.

use std::collections::BTreeMap;

use nexus_core::models::apps::Application;
use nexus_core::models::auth::{SessionUser, User};
use serde::{Deserialize, Serialize};

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    /// Present on password policy rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<PasswordStrength>,
}

/// Heuristic score of a rejected password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordStrength {
    pub score: u8,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// Auth

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Body of a successful login or session lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub success: bool,
    pub user: SessionUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

// Users

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    pub name: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
    pub is_active: Option<bool>,
    pub must_change_password: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsersResponse {
    pub users: Vec<User>,
}

// Applications

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub description: Option<String>,
    #[serde(default)]
    pub base_url: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    #[serde(alias = "uses_nexus_auth")]
    pub uses_auth: Option<bool>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub base_url: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
    #[serde(alias = "uses_nexus_auth")]
    pub uses_auth: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppResponse {
    pub app: Application,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppsResponse {
    pub apps: Vec<Application>,
}

// Access

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessUser {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessApp {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub is_active: bool,
}

/// Users, auth-participating apps and who may use what.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessMatrix {
    pub users: Vec<AccessUser>,
    pub apps: Vec<AccessApp>,
    #[serde(rename = "accessMap")]
    pub access_map: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToggleRequest {
    pub user_id: String,
    pub app_id: String,
    pub grant: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToggleResponse {
    pub success: bool,
    /// False when the grant was already in the requested state.
    pub changed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessReconcileRequest {
    pub user_id: String,
    #[serde(default)]
    pub app_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessReconcileResponse {
    pub success: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

// Audit and settings

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub action: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub settings: BTreeMap<String, String>,
}
