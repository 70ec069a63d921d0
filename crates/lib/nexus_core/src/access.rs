//! Access grant service.
//!
//! Wraps the grant store with existence checks, audit entries and a
//! per-user lock so single toggles and bulk reconciles for the same user
//! never interleave.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::audit::AuditRecorder;
use crate::models::apps::{AccessGrant, Application, GrantDiff};
use crate::models::audit::{AuditAction, ClientMeta, NewAuditEntry, TargetType};
use crate::models::auth::User;
use crate::store::{Store, StoreError, StoreResult};

/// Access service errors.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exclusive hold on one user's grants.
///
/// The lock-table entry is dropped on release once no other task holds a
/// handle to it, so the table only contains users with changes in flight.
struct UserLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    user_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// The user ↔ application relation plus its audit trail.
pub struct AccessGrants {
    store: Arc<dyn Store>,
    audit: AuditRecorder,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccessGrants {
    pub fn new(store: Arc<dyn Store>, audit: AuditRecorder) -> Self {
        Self {
            store,
            audit,
            locks: DashMap::new(),
        }
    }

    async fn lock_user(&self, user_id: &str) -> UserLock<'_> {
        let lock = Arc::clone(&self.locks.entry(user_id.to_string()).or_default());
        let guard = lock.lock_owned().await;
        UserLock {
            locks: &self.locks,
            user_id: user_id.to_string(),
            guard: Some(guard),
        }
    }

    async fn load_user(&self, user_id: &str) -> Result<User, AccessError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccessError::NotFound("User".to_string()))
    }

    async fn load_app(&self, app_id: &str) -> Result<Application, AccessError> {
        self.store
            .get_app(app_id)
            .await?
            .ok_or_else(|| AccessError::NotFound("Application".to_string()))
    }

    /// App ids currently granted to `user_id`.
    pub async fn list_for_user(&self, user_id: &str) -> StoreResult<BTreeSet<String>> {
        Ok(self.store.list_grants(user_id).await?.into_iter().collect())
    }

    /// Grant `app_id` to `user_id`. Returns false when the grant already existed.
    pub async fn grant(
        &self,
        user_id: &str,
        app_id: &str,
        granted_by: &str,
        client: &ClientMeta,
    ) -> Result<bool, AccessError> {
        let user = self.load_user(user_id).await?;
        let app = self.load_app(app_id).await?;

        let _lock = self.lock_user(user_id).await;

        let inserted = self
            .store
            .insert_grant(&AccessGrant {
                user_id: user_id.to_string(),
                app_id: app_id.to_string(),
                granted_at: Utc::now(),
                granted_by: Some(granted_by.to_string()),
            })
            .await?;

        if inserted {
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::AccessGranted)
                        .actor(granted_by)
                        .target(TargetType::Access, format!("{user_id}:{app_id}"))
                        .client(client)
                        .details(json!({
                            "username": user.username,
                            "app_name": app.name,
                            "app_slug": app.slug,
                        })),
                )
                .await;
        } else {
            debug!(user_id, app_id, "grant already present");
        }
        Ok(inserted)
    }

    /// Revoke `app_id` from `user_id`. Returns false when there was nothing to remove.
    pub async fn revoke(
        &self,
        user_id: &str,
        app_id: &str,
        revoked_by: &str,
        client: &ClientMeta,
    ) -> Result<bool, AccessError> {
        let user = self.load_user(user_id).await?;
        let app = self.load_app(app_id).await?;

        let _lock = self.lock_user(user_id).await;

        let removed = self.store.delete_grant(user_id, app_id).await?;
        if removed {
            self.audit
                .record(
                    NewAuditEntry::new(AuditAction::AccessRevoked)
                        .actor(revoked_by)
                        .target(TargetType::Access, format!("{user_id}:{app_id}"))
                        .client(client)
                        .details(json!({
                            "username": user.username,
                            "app_name": app.name,
                            "app_slug": app.slug,
                        })),
                )
                .await;
        }
        Ok(removed)
    }

    /// Replace the user's grant set with `desired` in one transaction.
    ///
    /// Duplicates in `desired` are ignored. Unknown application ids fail the
    /// whole call before anything is written. Exactly one ACCESS_GRANTED
    /// entry is recorded, carrying the resulting grant count.
    pub async fn reconcile(
        &self,
        user_id: &str,
        desired: &[String],
        granted_by: &str,
        client: &ClientMeta,
    ) -> Result<GrantDiff, AccessError> {
        let user = self.load_user(user_id).await?;

        let desired: BTreeSet<String> = desired.iter().cloned().collect();
        let known: BTreeSet<String> = self
            .store
            .list_apps()
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect();
        if let Some(unknown) = desired.iter().find(|id| !known.contains(*id)) {
            return Err(AccessError::NotFound(format!("Application {unknown}")));
        }
        let desired: Vec<String> = desired.into_iter().collect();

        let _lock = self.lock_user(user_id).await;

        let diff = self
            .store
            .replace_grants(user_id, &desired, granted_by, Utc::now())
            .await?;

        self.audit
            .record(
                NewAuditEntry::new(AuditAction::AccessGranted)
                    .actor(granted_by)
                    .target(TargetType::Access, user_id)
                    .client(client)
                    .details(json!({
                        "username": user.username,
                        "app_count": desired.len(),
                        "added": diff.added,
                        "removed": diff.removed,
                    })),
            )
            .await;

        Ok(diff)
    }

    /// Live slugs for minting: granted, active and auth-participating.
    pub async fn authorized_app_slugs(&self, user_id: &str) -> StoreResult<Vec<String>> {
        self.store.authorized_app_slugs(user_id).await
    }

    /// Store-backed check, unlike [`SessionUser::has_app`](crate::models::auth::SessionUser::has_app)
    /// which only sees the token snapshot.
    pub async fn is_authorized_now(&self, user_id: &str, slug: &str) -> StoreResult<bool> {
        Ok(self
            .authorized_app_slugs(user_id)
            .await?
            .iter()
            .any(|s| s == slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::audit::AuditQuery;
    use crate::store::{AppStore, GrantStore, MemoryStore, UserStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        grants: AccessGrants,
        audit: AuditRecorder,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_user(&User::new(
                "u1".into(),
                "alice",
                Some("Alice"),
                "hash".into(),
                false,
                None,
            ))
            .await
            .unwrap();
        let now = Utc::now();
        for (i, slug) in ["alpha", "beta", "gamma"].iter().enumerate() {
            store
                .insert_app(&Application {
                    id: slug[..1].to_string(),
                    name: slug.to_string(),
                    slug: slug.to_string(),
                    description: None,
                    base_url: format!("http://{slug}.local"),
                    icon: None,
                    color: None,
                    is_active: true,
                    uses_auth: true,
                    sort_order: i as i32 + 1,
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }
        let dyn_store: Arc<dyn Store> = store.clone();
        let audit = AuditRecorder::new(dyn_store.clone());
        Fixture {
            grants: AccessGrants::new(dyn_store, audit.clone()),
            store,
            audit,
        }
    }

    async fn audit_count(audit: &AuditRecorder, action: AuditAction) -> i64 {
        let mut query = AuditQuery::default();
        query.action = Some(action);
        audit.list(&query).await.unwrap().total
    }

    #[tokio::test]
    async fn grant_twice_yields_one_edge_and_one_entry() {
        let f = fixture().await;
        let client = ClientMeta::default();

        assert!(f.grants.grant("u1", "a", "admin", &client).await.unwrap());
        assert!(!f.grants.grant("u1", "a", "admin", &client).await.unwrap());

        assert_eq!(f.store.list_all_grants().await.unwrap().len(), 1);
        assert_eq!(audit_count(&f.audit, AuditAction::AccessGranted).await, 1);
    }

    #[tokio::test]
    async fn revoking_missing_edge_records_nothing() {
        let f = fixture().await;

        let removed = f
            .grants
            .revoke("u1", "a", "admin", &ClientMeta::default())
            .await
            .unwrap();

        assert!(!removed);
        assert_eq!(audit_count(&f.audit, AuditAction::AccessRevoked).await, 0);
    }

    #[tokio::test]
    async fn reconcile_replaces_set_with_single_entry() {
        let f = fixture().await;
        let client = ClientMeta::default();
        f.grants.grant("u1", "a", "admin", &client).await.unwrap();
        f.grants.grant("u1", "b", "admin", &client).await.unwrap();
        let before = audit_count(&f.audit, AuditAction::AccessGranted).await;

        let desired = vec!["b".to_string(), "g".to_string(), "g".to_string()];
        let diff = f
            .grants
            .reconcile("u1", &desired, "admin", &client)
            .await
            .unwrap();

        assert_eq!(diff.added, vec!["g".to_string()]);
        assert_eq!(diff.removed, vec!["a".to_string()]);
        let stored = f.grants.list_for_user("u1").await.unwrap();
        assert_eq!(stored, BTreeSet::from(["b".to_string(), "g".to_string()]));
        assert_eq!(
            audit_count(&f.audit, AuditAction::AccessGranted).await,
            before + 1
        );
    }

    #[tokio::test]
    async fn reconcile_rejects_unknown_app_without_writing() {
        let f = fixture().await;
        f.grants
            .grant("u1", "a", "admin", &ClientMeta::default())
            .await
            .unwrap();

        let err = f
            .grants
            .reconcile("u1", &["zzz".to_string()], "admin", &ClientMeta::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AccessError::NotFound(_)));
        assert_eq!(
            f.grants.list_for_user("u1").await.unwrap(),
            BTreeSet::from(["a".to_string()])
        );
    }

    #[tokio::test]
    async fn grant_for_unknown_user_is_not_found() {
        let f = fixture().await;
        let err = f
            .grants
            .grant("nobody", "a", "admin", &ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NotFound(_)));
    }

    #[tokio::test]
    async fn live_check_follows_revocation() {
        let f = fixture().await;
        let client = ClientMeta::default();
        f.grants.grant("u1", "b", "admin", &client).await.unwrap();
        assert!(f.grants.is_authorized_now("u1", "beta").await.unwrap());

        f.grants.revoke("u1", "b", "admin", &client).await.unwrap();
        assert!(!f.grants.is_authorized_now("u1", "beta").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_toggles_and_reconcile_settle_consistently() {
        let f = Arc::new(fixture().await);
        let mut handles = Vec::new();
        for i in 0..16 {
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                let client = ClientMeta::default();
                if i % 2 == 0 {
                    f.grants.grant("u1", "a", "admin", &client).await.unwrap();
                } else {
                    f.grants
                        .reconcile("u1", &["b".to_string()], "admin", &client)
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let stored = f.grants.list_for_user("u1").await.unwrap();
        assert!(stored.contains("b"));
        assert!(stored.len() <= 2);
        assert!(f.grants.locks.is_empty());
    }

    #[tokio::test]
    async fn lock_table_entry_released_after_each_change() {
        let f = fixture().await;
        let client = ClientMeta::default();

        f.grants.grant("u1", "a", "admin", &client).await.unwrap();
        assert!(f.grants.locks.is_empty());

        let held = f.grants.lock_user("u1").await;
        assert_eq!(f.grants.locks.len(), 1);
        drop(held);
        assert!(f.grants.locks.is_empty());

        f.grants
            .reconcile("u1", &["b".to_string()], "admin", &client)
            .await
            .unwrap();
        f.grants.revoke("u1", "b", "admin", &client).await.unwrap();
        assert!(f.grants.locks.is_empty());
    }
}
