//! Application registry handlers.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::extract::{AdminUser, ClientInfo};
use crate::models::{AppResponse, AppsResponse, CreateAppRequest, SuccessResponse, UpdateAppRequest};
use crate::services::apps;

/// `GET /api/apps`: ordered by sort order, then name.
pub async fn list_apps_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<AppsResponse>> {
    let apps = state.store.list_apps().await?;
    Ok(Json(AppsResponse { apps }))
}

/// `POST /api/apps`
pub async fn create_app_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Json(body): Json<CreateAppRequest>,
) -> AppResult<Json<AppResponse>> {
    let app = apps::create_app(&state, &admin, body, &client).await?;
    Ok(Json(AppResponse { app }))
}

/// `GET /api/apps/{id}`
pub async fn get_app_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<AppResponse>> {
    let app = apps::get_app(&state, &id).await?;
    Ok(Json(AppResponse { app }))
}

/// `PUT /api/apps/{id}`
pub async fn update_app_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Path(id): Path<String>,
    Json(body): Json<UpdateAppRequest>,
) -> AppResult<Json<AppResponse>> {
    let app = apps::update_app(&state, &admin, &id, body, &client).await?;
    Ok(Json(AppResponse { app }))
}

/// `DELETE /api/apps/{id}`
pub async fn delete_app_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Path(id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    apps::delete_app(&state, &admin, &id, &client).await?;
    Ok(Json(SuccessResponse::ok()))
}
