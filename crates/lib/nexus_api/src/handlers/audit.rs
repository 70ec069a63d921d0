//! Audit trail handler.

use axum::Json;
use axum::extract::{Query, State};
use nexus_core::models::audit::{AuditAction, AuditPage, AuditQuery};

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::extract::AdminUser;
use crate::models::AuditParams;

/// `GET /api/audit?limit&offset&action&user_id`: newest first.
pub async fn list_audit_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<AuditParams>,
) -> AppResult<Json<AuditPage>> {
    let mut query = AuditQuery::new(params.limit, params.offset);
    query.action = params
        .action
        .filter(|a| !a.is_empty())
        .map(|a| a.parse::<AuditAction>())
        .transpose()
        .map_err(AppError::Validation)?;
    query.user_id = params.user_id.filter(|u| !u.is_empty());

    let page = state.audit.list(&query).await?;
    Ok(Json(page))
}
