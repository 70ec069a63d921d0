//! Downstream application and access-grant models.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A downstream service registered with the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Application {
    pub id: String,
    pub name: String,
    /// Unique; this is what appears in the token `apps` claim.
    pub slug: String,
    pub description: Option<String>,
    pub base_url: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: bool,
    /// Whether the application participates in hub authentication at all.
    pub uses_auth: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Only active, auth-participating apps can appear in a session's claims.
    pub fn is_claimable(&self) -> bool {
        self.is_active && self.uses_auth
    }
}

/// Edge of the user ↔ application relation. Existence means authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AccessGrant {
    pub user_id: String,
    pub app_id: String,
    pub granted_at: DateTime<Utc>,
    pub granted_by: Option<String>,
}

/// Result of replacing a user's grant set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl GrantDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Returns true when `slug` is non-empty and only `[a-z0-9-]`.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
