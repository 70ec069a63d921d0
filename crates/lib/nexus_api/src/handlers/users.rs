//! User administration handlers.

use axum::Json;
use axum::extract::{Path, State};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::extract::{AdminUser, ClientInfo};
use crate::models::{
    CreateUserRequest, SuccessResponse, UpdateUserRequest, UserResponse, UsersResponse,
};
use crate::services::users;

/// `GET /api/users`: every user, newest first.
pub async fn list_users_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<UsersResponse>> {
    let users = state.store.list_users().await?;
    Ok(Json(UsersResponse { users }))
}

/// `POST /api/users`
pub async fn create_user_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = users::create_user(&state, &admin, body, &client).await?;
    Ok(Json(UserResponse { user }))
}

/// `GET /api/users/{id}`
pub async fn get_user_handler(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<UserResponse>> {
    let user = users::get_user(&state, &id).await?;
    Ok(Json(UserResponse { user }))
}

/// `PUT /api/users/{id}`
pub async fn update_user_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Path(id): Path<String>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = users::update_user(&state, &admin, &id, body, &client).await?;
    Ok(Json(UserResponse { user }))
}

/// `DELETE /api/users/{id}`
pub async fn delete_user_handler(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    ClientInfo(client): ClientInfo,
    Path(id): Path<String>,
) -> AppResult<Json<SuccessResponse>> {
    users::delete_user(&state, &admin, &id, &client).await?;
    Ok(Json(SuccessResponse::ok()))
}
