//! Application registry administration.

use chrono::Utc;
use nexus_core::models::apps::{Application, is_valid_slug};
use nexus_core::models::audit::{AuditAction, ClientMeta, NewAuditEntry, TargetType};
use nexus_core::models::auth::SessionUser;
use nexus_core::uuid::new_id;
use serde_json::{Map, Value, json};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::models::{CreateAppRequest, UpdateAppRequest};

const SLUG_RULE: &str = "Slug must contain only lowercase letters, numbers, and hyphens";

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

pub async fn get_app(state: &AppState, id: &str) -> AppResult<Application> {
    state
        .store
        .get_app(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".into()))
}

/// Register an application at the end of the sort order.
pub async fn create_app(
    state: &AppState,
    actor: &SessionUser,
    req: CreateAppRequest,
    client: &ClientMeta,
) -> AppResult<Application> {
    if req.name.trim().is_empty() || req.slug.is_empty() || req.base_url.trim().is_empty() {
        return Err(AppError::Validation(
            "Name, slug, and base_url are required".into(),
        ));
    }
    if !is_valid_slug(&req.slug) {
        return Err(AppError::Validation(SLUG_RULE.into()));
    }

    let now = Utc::now();
    let app = Application {
        id: new_id(),
        name: req.name.trim().to_string(),
        slug: req.slug,
        description: optional(req.description),
        base_url: req.base_url.trim().to_string(),
        icon: optional(req.icon),
        color: optional(req.color),
        is_active: true,
        uses_auth: req.uses_auth.unwrap_or(true),
        sort_order: state.store.next_sort_order().await?,
        created_at: now,
        updated_at: now,
    };
    state.store.insert_app(&app).await?;

    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::AppCreated)
                .actor(&actor.id)
                .target(TargetType::App, &app.id)
                .client(client)
                .details(json!({
                    "name": app.name,
                    "slug": app.slug,
                    "base_url": app.base_url,
                })),
        )
        .await;
    Ok(app)
}

/// Apply a partial update. A new slug must be valid and unused.
pub async fn update_app(
    state: &AppState,
    actor: &SessionUser,
    id: &str,
    req: UpdateAppRequest,
    client: &ClientMeta,
) -> AppResult<Application> {
    let mut app = get_app(state, id).await?;
    let mut changes = Map::new();

    if let Some(name) = req.name {
        changes.insert("name".into(), json!(name));
        app.name = name;
    }
    if let Some(slug) = req.slug {
        if !is_valid_slug(&slug) {
            return Err(AppError::Validation(SLUG_RULE.into()));
        }
        changes.insert("slug".into(), json!(slug));
        app.slug = slug;
    }
    if let Some(description) = req.description {
        changes.insert("description".into(), json!(description));
        app.description = optional(Some(description));
    }
    if let Some(base_url) = req.base_url {
        changes.insert("base_url".into(), json!(base_url));
        app.base_url = base_url;
    }
    if let Some(icon) = req.icon {
        changes.insert("icon".into(), json!(icon));
        app.icon = optional(Some(icon));
    }
    if let Some(color) = req.color {
        changes.insert("color".into(), json!(color));
        app.color = optional(Some(color));
    }
    if let Some(is_active) = req.is_active {
        changes.insert("is_active".into(), json!(is_active));
        app.is_active = is_active;
    }
    if let Some(sort_order) = req.sort_order {
        changes.insert("sort_order".into(), json!(sort_order));
        app.sort_order = sort_order;
    }
    if let Some(uses_auth) = req.uses_auth {
        changes.insert("uses_auth".into(), json!(uses_auth));
        app.uses_auth = uses_auth;
    }
    if changes.is_empty() {
        return Err(AppError::Validation("No updates provided".into()));
    }

    app.updated_at = Utc::now();
    if !state.store.update_app(&app).await? {
        return Err(AppError::NotFound("Application not found".into()));
    }

    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::AppUpdated)
                .actor(&actor.id)
                .target(TargetType::App, id)
                .client(client)
                .details(Value::Object(changes)),
        )
        .await;
    Ok(app)
}

/// Remove an application and every grant to it.
pub async fn delete_app(
    state: &AppState,
    actor: &SessionUser,
    id: &str,
    client: &ClientMeta,
) -> AppResult<()> {
    let app = get_app(state, id).await?;
    if !state.store.delete_app(id).await? {
        return Err(AppError::NotFound("Application not found".into()));
    }

    state
        .audit
        .record(
            NewAuditEntry::new(AuditAction::AppDeleted)
                .actor(&actor.id)
                .target(TargetType::App, id)
                .client(client)
                .details(json!({ "name": app.name, "slug": app.slug })),
        )
        .await;
    Ok(())
}
