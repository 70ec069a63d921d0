//! Settings handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;
use nexus_core::models::audit::{AuditAction, NewAuditEntry, TargetType};
use serde_json::Value;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::extract::{AdminUser, ClientInfo};
use crate::models::{SettingsResponse, SuccessResponse};

/// `GET /api/settings`
pub async fn get_settings_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<SettingsResponse>> {
    let settings = state.store.list_settings().await?;
    Ok(Json(SettingsResponse { settings }))
}

/// `PUT /api/settings`: upsert string values; other value types are ignored.
pub async fn update_settings_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Json(body): Json<BTreeMap<String, Value>>,
) -> AppResult<Json<SuccessResponse>> {
    let changes: BTreeMap<String, String> = body
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect();
    state.store.put_settings(&changes).await?;

    let mut entry = NewAuditEntry::new(AuditAction::SettingsUpdated)
        .actor(&admin.id)
        .client(&client)
        .details(serde_json::to_value(&changes).unwrap_or(Value::Null));
    entry.target_type = Some(TargetType::Settings);
    state.audit.record(entry).await;

    Ok(Json(SuccessResponse::ok()))
}
