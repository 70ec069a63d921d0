//! Durable storage seam.
//!
//! The flows and services only see these traits. [`PgStore`] is the
//! production backend; [`MemoryStore`] backs development runs and tests.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::apps::{AccessGrant, Application, GrantDiff};
use crate::models::audit::{AuditQuery, AuditRecord, NewAuditEntry};
use crate::models::auth::User;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced row does not exist.
    #[error("Missing reference: {0}")]
    MissingReference(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;
    /// All users, newest first.
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn count_users(&self) -> StoreResult<i64>;
    /// Fails with [`StoreError::Conflict`] on a duplicate username.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    /// Persist every mutable column of `user`. Returns false if it does not exist.
    async fn update_user(&self, user: &User) -> StoreResult<bool>;
    /// Delete a user and, by cascade, its grants.
    async fn delete_user(&self, id: &str) -> StoreResult<bool>;
    /// Store a new password hash and set the must-change flag.
    async fn set_password(
        &self,
        id: &str,
        password_hash: &str,
        must_change_password: bool,
    ) -> StoreResult<()>;
    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()>;
}

#[async_trait]
pub trait AppStore: Send + Sync {
    /// All applications ordered by sort order, then name.
    async fn list_apps(&self) -> StoreResult<Vec<Application>>;
    async fn get_app(&self, id: &str) -> StoreResult<Option<Application>>;
    /// Fails with [`StoreError::Conflict`] on a duplicate slug.
    async fn insert_app(&self, app: &Application) -> StoreResult<()>;
    async fn update_app(&self, app: &Application) -> StoreResult<bool>;
    /// Delete an application and, by cascade, its grants.
    async fn delete_app(&self, id: &str) -> StoreResult<bool>;
    /// `max(sort_order) + 1`, or 1 for an empty table.
    async fn next_sort_order(&self) -> StoreResult<i32>;
}

#[async_trait]
pub trait GrantStore: Send + Sync {
    /// App ids granted to `user_id`.
    async fn list_grants(&self, user_id: &str) -> StoreResult<Vec<String>>;
    async fn list_all_grants(&self) -> StoreResult<Vec<AccessGrant>>;
    /// Insert unless present. Returns true if a row was inserted.
    async fn insert_grant(&self, grant: &AccessGrant) -> StoreResult<bool>;
    /// Returns true if a row was removed.
    async fn delete_grant(&self, user_id: &str, app_id: &str) -> StoreResult<bool>;
    /// Replace the user's grant set with `app_ids` atomically.
    async fn replace_grants(
        &self,
        user_id: &str,
        app_ids: &[String],
        granted_by: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<GrantDiff>;
    /// Slugs of granted applications that are active and use hub auth.
    async fn authorized_app_slugs(&self, user_id: &str) -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append an entry, returning its id.
    async fn append_audit(&self, entry: &NewAuditEntry) -> StoreResult<i64>;
    /// Entries matching `query`, newest first, plus the unpaged total.
    async fn list_audit(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditRecord>, i64)>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn list_settings(&self) -> StoreResult<BTreeMap<String, String>>;
    async fn put_settings(&self, values: &BTreeMap<String, String>) -> StoreResult<()>;
}

/// Everything the hub persists.
pub trait Store: UserStore + AppStore + GrantStore + AuditStore + SettingsStore {}

impl<T> Store for T where T: UserStore + AppStore + GrantStore + AuditStore + SettingsStore {}
