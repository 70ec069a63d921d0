//! In-memory store.
//!
//! Holds everything in ordered maps behind one lock. Nothing is persisted;
//! intended for tests and `--in-memory` development runs. Constraint
//! behaviour (unique username and slug, grant cascades, foreign keys on
//! grants) matches the PostgreSQL schema.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    AppStore, AuditStore, GrantStore, SettingsStore, StoreError, StoreResult, UserStore,
};
use crate::models::apps::{AccessGrant, Application, GrantDiff};
use crate::models::audit::{AuditQuery, AuditRecord, NewAuditEntry};
use crate::models::auth::User;

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<String, User>,
    apps: BTreeMap<String, Application>,
    /// Keyed by `(user_id, app_id)`.
    grants: BTreeMap<(String, String), AccessGrant>,
    audit: Vec<AuditRecord>,
    settings: BTreeMap<String, String>,
}

impl State {
    fn username_taken(&self, username: &str, except: Option<&str>) -> bool {
        self.users
            .values()
            .any(|u| u.username == username && Some(u.id.as_str()) != except)
    }

    fn slug_taken(&self, slug: &str, except: Option<&str>) -> bool {
        self.apps
            .values()
            .any(|a| a.slug == slug && Some(a.id.as_str()) != except)
    }

    fn grants_of(&self, user_id: &str) -> BTreeSet<String> {
        self.grants
            .keys()
            .filter(|(u, _)| u == user_id)
            .map(|(_, a)| a.clone())
            .collect()
    }
}

/// Shared, cloneable in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Empty store seeded with the same default settings as the migration.
    pub fn new() -> Self {
        let mut state = State::default();
        state
            .settings
            .insert("nexus_host".to_string(), "localhost".to_string());
        state
            .settings
            .insert("nexus_port".to_string(), "4000".to_string());
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.state.read().await.users.len() as i64)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.username_taken(&user.username, None) || state.users.contains_key(&user.id) {
            return Err(StoreError::Conflict("username already exists".to_string()));
        }
        state.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let Some(existing) = state.users.get_mut(&user.id) else {
            return Ok(false);
        };
        existing.name = user.name.clone();
        existing.password_hash = user.password_hash.clone();
        existing.is_admin = user.is_admin;
        existing.is_active = user.is_active;
        existing.must_change_password = user.must_change_password;
        existing.updated_at = user.updated_at;
        Ok(true)
    }

    async fn delete_user(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.users.remove(id).is_none() {
            return Ok(false);
        }
        state.grants.retain(|(user_id, _), _| user_id != id);
        Ok(true)
    }

    async fn set_password(
        &self,
        id: &str,
        password_hash: &str,
        must_change_password: bool,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(id) {
            user.password_hash = password_hash.to_string();
            user.must_change_password = must_change_password;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.users.get_mut(id) {
            user.last_login_at = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl AppStore for MemoryStore {
    async fn list_apps(&self) -> StoreResult<Vec<Application>> {
        let state = self.state.read().await;
        let mut apps: Vec<Application> = state.apps.values().cloned().collect();
        apps.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        Ok(apps)
    }

    async fn get_app(&self, id: &str) -> StoreResult<Option<Application>> {
        Ok(self.state.read().await.apps.get(id).cloned())
    }

    async fn insert_app(&self, app: &Application) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.slug_taken(&app.slug, None) || state.apps.contains_key(&app.id) {
            return Err(StoreError::Conflict(
                "an application with this slug already exists".to_string(),
            ));
        }
        state.apps.insert(app.id.clone(), app.clone());
        Ok(())
    }

    async fn update_app(&self, app: &Application) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if !state.apps.contains_key(&app.id) {
            return Ok(false);
        }
        if state.slug_taken(&app.slug, Some(&app.id)) {
            return Err(StoreError::Conflict(
                "an application with this slug already exists".to_string(),
            ));
        }
        let mut updated = app.clone();
        if let Some(existing) = state.apps.get(&app.id) {
            updated.created_at = existing.created_at;
        }
        state.apps.insert(app.id.clone(), updated);
        Ok(true)
    }

    async fn delete_app(&self, id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if state.apps.remove(id).is_none() {
            return Ok(false);
        }
        state.grants.retain(|(_, app_id), _| app_id != id);
        Ok(true)
    }

    async fn next_sort_order(&self) -> StoreResult<i32> {
        let state = self.state.read().await;
        Ok(state.apps.values().map(|a| a.sort_order).max().unwrap_or(0) + 1)
    }
}

#[async_trait]
impl GrantStore for MemoryStore {
    async fn list_grants(&self, user_id: &str) -> StoreResult<Vec<String>> {
        Ok(self.state.read().await.grants_of(user_id).into_iter().collect())
    }

    async fn list_all_grants(&self) -> StoreResult<Vec<AccessGrant>> {
        Ok(self.state.read().await.grants.values().cloned().collect())
    }

    async fn insert_grant(&self, grant: &AccessGrant) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&grant.user_id) || !state.apps.contains_key(&grant.app_id) {
            return Err(StoreError::MissingReference(
                "user or application does not exist".to_string(),
            ));
        }
        let key = (grant.user_id.clone(), grant.app_id.clone());
        if state.grants.contains_key(&key) {
            return Ok(false);
        }
        state.grants.insert(key, grant.clone());
        Ok(true)
    }

    async fn delete_grant(&self, user_id: &str, app_id: &str) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        Ok(state
            .grants
            .remove(&(user_id.to_string(), app_id.to_string()))
            .is_some())
    }

    async fn replace_grants(
        &self,
        user_id: &str,
        app_ids: &[String],
        granted_by: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<GrantDiff> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(user_id) {
            return Err(StoreError::MissingReference(format!("user {user_id}")));
        }
        let desired: BTreeSet<String> = app_ids.iter().cloned().collect();
        if let Some(missing) = desired.iter().find(|id| !state.apps.contains_key(*id)) {
            return Err(StoreError::MissingReference(format!("application {missing}")));
        }

        let current = state.grants_of(user_id);
        let diff = GrantDiff {
            added: desired.difference(&current).cloned().collect(),
            removed: current.difference(&desired).cloned().collect(),
        };

        for app_id in &diff.removed {
            state.grants.remove(&(user_id.to_string(), app_id.clone()));
        }
        for app_id in &diff.added {
            state.grants.insert(
                (user_id.to_string(), app_id.clone()),
                AccessGrant {
                    user_id: user_id.to_string(),
                    app_id: app_id.clone(),
                    granted_at: at,
                    granted_by: Some(granted_by.to_string()),
                },
            );
        }
        Ok(diff)
    }

    async fn authorized_app_slugs(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let mut apps: Vec<&Application> = state
            .grants_of(user_id)
            .iter()
            .filter_map(|id| state.apps.get(id))
            .filter(|a| a.is_claimable())
            .collect();
        apps.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        Ok(apps.into_iter().map(|a| a.slug.clone()).collect())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, entry: &NewAuditEntry) -> StoreResult<i64> {
        let mut state = self.state.write().await;
        let id = state.audit.len() as i64 + 1;
        state.audit.push(AuditRecord {
            id,
            user_id: entry.user_id.clone(),
            username: None,
            action: entry.action.as_str().to_string(),
            target_type: entry.target_type.map(|t| t.as_str().to_string()),
            target_id: entry.target_id.clone(),
            ip_address: entry.ip_address.clone(),
            user_agent: entry.user_agent.clone(),
            details: entry.details.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_audit(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditRecord>, i64)> {
        let state = self.state.read().await;
        let matching: Vec<&AuditRecord> = state
            .audit
            .iter()
            .rev()
            .filter(|r| query.action.is_none_or(|a| r.action == a.as_str()))
            .filter(|r| {
                query
                    .user_id
                    .as_deref()
                    .is_none_or(|u| r.user_id.as_deref() == Some(u))
            })
            .collect();
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .map(|r| {
                let mut record = r.clone();
                record.username = r
                    .user_id
                    .as_ref()
                    .and_then(|id| state.users.get(id))
                    .map(|u| u.username.clone());
                record
            })
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn list_settings(&self) -> StoreResult<BTreeMap<String, String>> {
        Ok(self.state.read().await.settings.clone())
    }

    async fn put_settings(&self, values: &BTreeMap<String, String>) -> StoreResult<()> {
        let mut state = self.state.write().await;
        for (key, value) in values {
            state.settings.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}
