//! Authentication request handlers.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{CookieJar, SameSite};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::extract::{ClientInfo, CurrentUser};
use crate::models::{
    ChangePasswordRequest, LoginRequest, MessageResponse, SessionResponse, SuccessResponse,
};
use crate::services::auth;
use crate::services::cookies::{clear_session_cookie, session_cookie};
use crate::services::session;

/// `POST /api/auth/login`: authenticate and set the session cookie.
pub async fn login_handler(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let grant = auth::login(&state, &body.username, &body.password, &client).await?;
    let cookie = session_cookie(
        &grant.token,
        state.config.cookie_max_age_secs(),
        state.config.secure_cookies(),
        SameSite::Lax,
    );
    Ok((
        CookieJar::new().add(cookie),
        Json(SessionResponse {
            success: true,
            user: grant.session,
        }),
    ))
}

/// `POST /api/auth/logout`: always succeeds and always clears the cookie.
pub async fn logout_handler(
    State(state): State<AppState>,
    ClientInfo(client): ClientInfo,
    headers: HeaderMap,
) -> (CookieJar, Json<SuccessResponse>) {
    let current = session::resolve(&headers, &state.tokens).into_session();
    auth::logout(&state, current.as_ref(), &client).await;
    (
        CookieJar::new().add(clear_session_cookie(state.config.secure_cookies())),
        Json(SuccessResponse::ok()),
    )
}

/// `POST /api/auth/change-password`: rotate the password and re-issue the cookie.
pub async fn change_password_handler(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    ClientInfo(client): ClientInfo,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<(CookieJar, Json<MessageResponse>)> {
    let grant = auth::change_password(
        &state,
        &current,
        &body.current_password,
        &body.new_password,
        &client,
    )
    .await?;
    let cookie = session_cookie(
        &grant.token,
        state.config.cookie_max_age_secs(),
        state.config.secure_cookies(),
        SameSite::Strict,
    );
    Ok((
        CookieJar::new().add(cookie),
        Json(MessageResponse {
            success: true,
            message: "Password changed successfully".into(),
        }),
    ))
}

/// `GET /api/auth/session`: the caller's session as encoded in their token.
pub async fn session_handler(CurrentUser(current): CurrentUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        success: true,
        user: current,
    })
}
