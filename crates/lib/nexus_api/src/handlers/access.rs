//! Access grant handlers.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::extract::{AdminUser, ClientInfo};
use crate::models::{
    AccessApp, AccessMatrix, AccessReconcileRequest, AccessReconcileResponse,
    AccessToggleRequest, AccessToggleResponse, AccessUser,
};

/// `GET /api/access`: users, auth-participating apps and the grant map.
pub async fn matrix_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<AccessMatrix>> {
    let mut users: Vec<AccessUser> = state
        .store
        .list_users()
        .await?
        .into_iter()
        .map(|u| AccessUser {
            id: u.id,
            username: u.username,
            name: u.name,
            is_admin: u.is_admin,
            is_active: u.is_active,
        })
        .collect();
    users.sort_by(|a, b| a.username.cmp(&b.username));

    let apps = state
        .store
        .list_apps()
        .await?
        .into_iter()
        .filter(|a| a.uses_auth)
        .map(|a| AccessApp {
            id: a.id,
            name: a.name,
            slug: a.slug,
            is_active: a.is_active,
        })
        .collect();

    let mut access_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for grant in state.store.list_all_grants().await? {
        access_map.entry(grant.user_id).or_default().push(grant.app_id);
    }

    Ok(Json(AccessMatrix {
        users,
        apps,
        access_map,
    }))
}

/// `POST /api/access`: grant or revoke one application for one user.
pub async fn toggle_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Json(body): Json<AccessToggleRequest>,
) -> AppResult<Json<AccessToggleResponse>> {
    let changed = if body.grant {
        state
            .grants
            .grant(&body.user_id, &body.app_id, &admin.id, &client)
            .await?
    } else {
        state
            .grants
            .revoke(&body.user_id, &body.app_id, &admin.id, &client)
            .await?
    };
    Ok(Json(AccessToggleResponse {
        success: true,
        changed,
    }))
}

/// `PUT /api/access`: replace a user's whole grant set.
pub async fn reconcile_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Json(body): Json<AccessReconcileRequest>,
) -> AppResult<Json<AccessReconcileResponse>> {
    let diff = state
        .grants
        .reconcile(&body.user_id, &body.app_ids, &admin.id, &client)
        .await?;
    Ok(Json(AccessReconcileResponse {
        success: true,
        added: diff.added,
        removed: diff.removed,
    }))
}
