//! PostgreSQL store backed by a `sqlx` pool.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{
    AppStore, AuditStore, GrantStore, SettingsStore, StoreError, StoreResult, UserStore,
};
use crate::models::apps::{AccessGrant, Application, GrantDiff};
use crate::models::audit::{AuditQuery, AuditRecord, NewAuditEntry};
use crate::models::auth::User;

const USER_COLUMNS: &str = "id, username, name, password_hash, is_admin, is_active, \
     must_change_password, created_at, updated_at, last_login_at, created_by";

const APP_COLUMNS: &str = "id, name, slug, description, base_url, icon, color, is_active, \
     uses_auth, sort_order, created_at, updated_at";

/// Map constraint violations onto the store's error kinds.
fn classify(e: sqlx::Error, what: &str) -> StoreError {
    if let Some(db) = e.as_database_error() {
        match db.code().as_deref() {
            Some("23505") => return StoreError::Conflict(what.to_string()),
            Some("23503") => return StoreError::MissingReference(what.to_string()),
            _ => {}
        }
    }
    StoreError::Db(e)
}

/// Store over a PostgreSQL pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let users = sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn count_users(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, name, password_hash, is_admin, is_active,
                               must_change_password, created_at, updated_at, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(user.is_active)
        .bind(user.must_change_password)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(&user.created_by)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, "username already exists"))?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = $2, password_hash = $3, is_admin = $4, is_active = $5,
                must_change_password = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.password_hash)
        .bind(user.is_admin)
        .bind(user.is_active)
        .bind(user.must_change_password)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_password(
        &self,
        id: &str,
        password_hash: &str,
        must_change_password: bool,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, must_change_password = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .bind(must_change_password)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_login(&self, id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AppStore for PgStore {
    async fn list_apps(&self) -> StoreResult<Vec<Application>> {
        let sql = format!("SELECT {APP_COLUMNS} FROM applications ORDER BY sort_order, name");
        let apps = sqlx::query_as::<_, Application>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(apps)
    }

    async fn get_app(&self, id: &str) -> StoreResult<Option<Application>> {
        let sql = format!("SELECT {APP_COLUMNS} FROM applications WHERE id = $1");
        let app = sqlx::query_as::<_, Application>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(app)
    }

    async fn insert_app(&self, app: &Application) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO applications (id, name, slug, description, base_url, icon, color,
                                      is_active, uses_auth, sort_order, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&app.id)
        .bind(&app.name)
        .bind(&app.slug)
        .bind(&app.description)
        .bind(&app.base_url)
        .bind(&app.icon)
        .bind(&app.color)
        .bind(app.is_active)
        .bind(app.uses_auth)
        .bind(app.sort_order)
        .bind(app.created_at)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, "an application with this slug already exists"))?;
        Ok(())
    }

    async fn update_app(&self, app: &Application) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE applications
            SET name = $2, slug = $3, description = $4, base_url = $5, icon = $6, color = $7,
                is_active = $8, uses_auth = $9, sort_order = $10, updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(&app.id)
        .bind(&app.name)
        .bind(&app.slug)
        .bind(&app.description)
        .bind(&app.base_url)
        .bind(&app.icon)
        .bind(&app.color)
        .bind(app.is_active)
        .bind(app.uses_auth)
        .bind(app.sort_order)
        .bind(app.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, "an application with this slug already exists"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_app(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn next_sort_order(&self) -> StoreResult<i32> {
        let next =
            sqlx::query_scalar::<_, i32>("SELECT COALESCE(MAX(sort_order), 0) + 1 FROM applications")
                .fetch_one(&self.pool)
                .await?;
        Ok(next)
    }
}

#[async_trait]
impl GrantStore for PgStore {
    async fn list_grants(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let rows =
            sqlx::query_scalar::<_, String>("SELECT app_id FROM user_app_access WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    async fn list_all_grants(&self) -> StoreResult<Vec<AccessGrant>> {
        let rows = sqlx::query_as::<_, AccessGrant>(
            "SELECT user_id, app_id, granted_at, granted_by FROM user_app_access",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_grant(&self, grant: &AccessGrant) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_app_access (user_id, app_id, granted_at, granted_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, app_id) DO NOTHING
            "#,
        )
        .bind(&grant.user_id)
        .bind(&grant.app_id)
        .bind(grant.granted_at)
        .bind(&grant.granted_by)
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, "user or application does not exist"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_grant(&self, user_id: &str, app_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM user_app_access WHERE user_id = $1 AND app_id = $2")
            .bind(user_id)
            .bind(app_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_grants(
        &self,
        user_id: &str,
        app_ids: &[String],
        granted_by: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<GrantDiff> {
        let mut tx = self.pool.begin().await?;

        // Lock the user row so concurrent reconciles for one user serialize.
        let locked = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(StoreError::MissingReference(format!("user {user_id}")));
        }

        let current: BTreeSet<String> =
            sqlx::query_scalar::<_, String>("SELECT app_id FROM user_app_access WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();
        let desired: BTreeSet<String> = app_ids.iter().cloned().collect();

        let diff = GrantDiff {
            added: desired.difference(&current).cloned().collect(),
            removed: current.difference(&desired).cloned().collect(),
        };

        for app_id in &diff.removed {
            sqlx::query("DELETE FROM user_app_access WHERE user_id = $1 AND app_id = $2")
                .bind(user_id)
                .bind(app_id)
                .execute(&mut *tx)
                .await?;
        }
        for app_id in &diff.added {
            sqlx::query(
                r#"
                INSERT INTO user_app_access (user_id, app_id, granted_at, granted_by)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(user_id)
            .bind(app_id)
            .bind(at)
            .bind(granted_by)
            .execute(&mut *tx)
            .await
            .map_err(|e| classify(e, &format!("application {app_id}")))?;
        }

        tx.commit().await?;
        Ok(diff)
    }

    async fn authorized_app_slugs(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let slugs = sqlx::query_scalar::<_, String>(
            r#"
            SELECT a.slug
            FROM applications a
            INNER JOIN user_app_access ua ON a.id = ua.app_id
            WHERE ua.user_id = $1 AND a.is_active AND a.uses_auth
            ORDER BY a.sort_order, a.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(slugs)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn append_audit(&self, entry: &NewAuditEntry) -> StoreResult<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO audit_log (user_id, action, target_type, target_id, ip_address,
                                   user_agent, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.target_type.map(|t| t.as_str()))
        .bind(&entry.target_id)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.details)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn list_audit(&self, query: &AuditQuery) -> StoreResult<(Vec<AuditRecord>, i64)> {
        let action = query.action.map(|a| a.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM audit_log al
            WHERE ($1::text IS NULL OR al.action = $1)
              AND ($2::text IS NULL OR al.user_id = $2)
            "#,
        )
        .bind(action)
        .bind(&query.user_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, AuditRecord>(
            r#"
            SELECT al.id, al.user_id, u.username, al.action, al.target_type, al.target_id,
                   al.ip_address, al.user_agent, al.details, al.created_at
            FROM audit_log al
            LEFT JOIN users u ON al.user_id = u.id
            WHERE ($1::text IS NULL OR al.action = $1)
              AND ($2::text IS NULL OR al.user_id = $2)
            ORDER BY al.created_at DESC, al.id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(action)
        .bind(&query.user_id)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn list_settings(&self) -> StoreResult<BTreeMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM settings")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    async fn put_settings(&self, values: &BTreeMap<String, String>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in values {
            sqlx::query(
                r#"
                INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, now())
                ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
