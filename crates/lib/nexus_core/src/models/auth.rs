//! Identity and session models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored user record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    /// Immutable after creation.
    pub username: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub must_change_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

impl User {
    /// Build a fresh, active user that must change its password on first login.
    pub fn new(
        id: String,
        username: &str,
        name: Option<&str>,
        password_hash: String,
        is_admin: bool,
        created_by: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            username: username.to_string(),
            name: name.map(str::to_string),
            password_hash,
            is_admin,
            is_active: true,
            must_change_password: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            created_by: created_by.map(str::to_string),
        }
    }
}

/// Authenticated session projected from a verified token.
///
/// `apps` is the snapshot of authorized application slugs taken when the
/// token was minted; it can lag behind the live grant store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
    pub is_admin: bool,
    pub must_change_password: bool,
    pub apps: Vec<String>,
}

impl SessionUser {
    /// Project a stored user plus its live authorized app slugs.
    pub fn from_user(user: &User, apps: Vec<String>) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            is_admin: user.is_admin,
            must_change_password: user.must_change_password,
            apps,
        }
    }

    /// Token-only check: was this user authorized for `slug` at mint time.
    pub fn has_app(&self, slug: &str) -> bool {
        self.apps.iter().any(|a| a == slug)
    }
}

/// JWT claims embedded in session tokens (HS256).
///
/// Every field is required on decode; a token missing any of them is
/// rejected rather than partially trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    /// Subject: the user id.
    pub sub: String,
    pub username: String,
    #[serde(deserialize_with = "Option::deserialize")]
    pub name: Option<String>,
    pub is_admin: bool,
    pub must_change_password: bool,
    /// Slugs of applications the user was authorized for at mint time.
    pub apps: Vec<String>,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

impl From<TokenClaims> for SessionUser {
    fn from(claims: TokenClaims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            name: claims.name,
            is_admin: claims.is_admin,
            must_change_password: claims.must_change_password,
            apps: claims.apps,
        }
    }
}
