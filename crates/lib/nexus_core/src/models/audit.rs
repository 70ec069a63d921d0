//! Audit trail models.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed vocabulary of security-relevant events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    LoginFailed,
    Logout,
    PasswordChanged,
    UserCreated,
    UserUpdated,
    UserDeleted,
    AppCreated,
    AppUpdated,
    AppDeleted,
    AccessGranted,
    AccessRevoked,
    SettingsUpdated,
}

impl AuditAction {
    pub const ALL: [AuditAction; 13] = [
        AuditAction::Login,
        AuditAction::LoginFailed,
        AuditAction::Logout,
        AuditAction::PasswordChanged,
        AuditAction::UserCreated,
        AuditAction::UserUpdated,
        AuditAction::UserDeleted,
        AuditAction::AppCreated,
        AuditAction::AppUpdated,
        AuditAction::AppDeleted,
        AuditAction::AccessGranted,
        AuditAction::AccessRevoked,
        AuditAction::SettingsUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::Logout => "LOGOUT",
            AuditAction::PasswordChanged => "PASSWORD_CHANGED",
            AuditAction::UserCreated => "USER_CREATED",
            AuditAction::UserUpdated => "USER_UPDATED",
            AuditAction::UserDeleted => "USER_DELETED",
            AuditAction::AppCreated => "APP_CREATED",
            AuditAction::AppUpdated => "APP_UPDATED",
            AuditAction::AppDeleted => "APP_DELETED",
            AuditAction::AccessGranted => "ACCESS_GRANTED",
            AuditAction::AccessRevoked => "ACCESS_REVOKED",
            AuditAction::SettingsUpdated => "SETTINGS_UPDATED",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown audit action '{s}'"))
    }
}

/// Kind of object an audit entry is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    User,
    App,
    Access,
    Settings,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::User => "user",
            TargetType::App => "app",
            TargetType::Access => "access",
            TargetType::Settings => "settings",
        }
    }
}

/// Client metadata captured from the inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    /// Key used by the login rate limiter.
    pub fn rate_limit_key(&self) -> String {
        self.ip_address
            .clone()
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// An audit entry about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub user_id: Option<String>,
    pub action: AuditAction,
    pub target_type: Option<TargetType>,
    pub target_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl NewAuditEntry {
    pub fn new(action: AuditAction) -> Self {
        Self {
            user_id: None,
            action,
            target_type: None,
            target_id: None,
            ip_address: None,
            user_agent: None,
            details: None,
        }
    }

    pub fn actor(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn target(mut self, target_type: TargetType, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type);
        self.target_id = Some(target_id.into());
        self
    }

    pub fn client(mut self, meta: &ClientMeta) -> Self {
        self.ip_address = meta.ip_address.clone();
        self.user_agent = meta.user_agent.clone();
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Stored audit entry, joined with the actor's username when known.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AuditRecord {
    pub id: i64,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub action: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Default page size for audit listings.
pub const DEFAULT_AUDIT_LIMIT: i64 = 50;

/// Largest page size a caller may request.
pub const MAX_AUDIT_LIMIT: i64 = 100;

/// Filter and paging for audit listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    pub limit: i64,
    pub offset: i64,
    pub action: Option<AuditAction>,
    pub user_id: Option<String>,
}

impl AuditQuery {
    /// Build a query, clamping the limit to `1..=MAX_AUDIT_LIMIT` and the offset to `>= 0`.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(DEFAULT_AUDIT_LIMIT)
                .clamp(1, MAX_AUDIT_LIMIT),
            offset: offset.unwrap_or(0).max(0),
            action: None,
            user_id: None,
        }
    }
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditPage {
    pub logs: Vec<AuditRecord>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
