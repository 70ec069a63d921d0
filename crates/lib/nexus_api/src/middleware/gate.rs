//! Request gate: the per-request authentication and authorization chokepoint.
//!
//! [`decide`] is the pure policy. Rules are evaluated in order and the first
//! match wins:
//!
//! 1. static assets and the public auth endpoints pass through;
//! 2. without a valid session, pages redirect to the login page carrying
//!    the original target and API calls get 401, and the session cookie is
//!    cleared either way;
//! 3. a pending password change sends pages to the change-password page and
//!    answers 403 on API paths outside `/api/auth`;
//! 4. admin prefixes require the admin flag (redirect home, or 403);
//! 5. a signed-in user asking for the login page goes home;
//! 6. everything else passes with the identity attached.
//!
//! [`gate`] applies the decision. It never touches the store.

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use nexus_core::models::auth::SessionUser;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::clear_session_cookie;
use crate::services::session::{SessionLookup, resolve};

pub const LOGIN_PAGE: &str = "/login";
pub const CHANGE_PASSWORD_PAGE: &str = "/change-password";
pub const HOME_PAGE: &str = "/";

/// Identity headers forwarded to downstream handlers.
pub const USER_ID_HEADER: &str = "x-nexus-user-id";
pub const USERNAME_HEADER: &str = "x-nexus-username";

const API_PREFIX: &str = "/api";
const AUTH_API_PREFIX: &str = "/api/auth";
const PUBLIC_API: &[&str] = &["/api/auth/login", "/api/auth/logout"];
const ASSET_PREFIXES: &[&str] = &["/_next", "/assets", "/static", "/favicon"];
const ADMIN_PREFIXES: &[&str] = &[
    "/admin",
    "/api/users",
    "/api/apps",
    "/api/access",
    "/api/audit",
    "/api/settings",
];

/// What the gate does with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Pass through without identity.
    Public,
    /// Pass through with the session attached.
    Allow,
    /// No valid session on an API path: 401.
    RejectUnauthenticated,
    /// No valid session on a page: go to the login page, then back to `target`.
    RedirectToLogin { target: String },
    /// Password change pending on a page.
    RedirectToChangePassword,
    /// Password change pending on a non-auth API path: 403.
    RejectPasswordChange,
    /// Non-admin on an admin page.
    RedirectHome,
    /// Non-admin on an admin API path: 403.
    RejectForbidden,
}

/// True when `path` is `prefix` or lies below it.
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

fn is_api(path: &str) -> bool {
    under(path, API_PREFIX)
}

fn is_asset(path: &str) -> bool {
    if ASSET_PREFIXES.iter().any(|p| under(path, p)) {
        return true;
    }
    // API ids may contain dots; only pages count as files by extension.
    !is_api(path) && path.rsplit('/').next().is_some_and(|seg| seg.contains('.'))
}

/// Pure gate policy for `path` (and its `query`) given the resolved session.
pub fn decide(path: &str, query: Option<&str>, session: Option<&SessionUser>) -> GateDecision {
    if is_asset(path) || PUBLIC_API.iter().any(|p| under(path, p)) {
        return GateDecision::Public;
    }
    let api = is_api(path);

    let Some(session) = session else {
        if path == LOGIN_PAGE {
            return GateDecision::Public;
        }
        if api {
            return GateDecision::RejectUnauthenticated;
        }
        let target = match query {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path.to_string(),
        };
        return GateDecision::RedirectToLogin { target };
    };

    if session.must_change_password
        && !under(path, CHANGE_PASSWORD_PAGE)
        && !under(path, AUTH_API_PREFIX)
    {
        return if api {
            GateDecision::RejectPasswordChange
        } else {
            GateDecision::RedirectToChangePassword
        };
    }

    if !session.is_admin && ADMIN_PREFIXES.iter().any(|p| under(path, p)) {
        return if api {
            GateDecision::RejectForbidden
        } else {
            GateDecision::RedirectHome
        };
    }

    if path == LOGIN_PAGE {
        return GateDecision::RedirectHome;
    }
    GateDecision::Allow
}

/// Login page URL that returns to `target` afterwards.
pub fn login_url(target: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("redirect", target)
        .finish();
    format!("{LOGIN_PAGE}?{query}")
}

fn clearing_cookie(state: &AppState, response: Response) -> Response {
    let jar = CookieJar::new().add(clear_session_cookie(state.config.secure_cookies()));
    (jar, response).into_response()
}

/// Axum middleware applying [`decide`] to every request.
///
/// Inbound identity headers are always stripped; on `Allow` the gate sets
/// its own and inserts the [`SessionUser`] into request extensions.
pub async fn gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let headers = request.headers_mut();
    headers.remove(USER_ID_HEADER);
    headers.remove(USERNAME_HEADER);

    let lookup = resolve(request.headers(), &state.tokens);
    if lookup == SessionLookup::Invalid {
        debug!(path = %request.uri().path(), "ignoring invalid session token");
    }
    let session = lookup.into_session();

    let decision = decide(
        request.uri().path(),
        request.uri().query(),
        session.as_ref(),
    );

    match decision {
        GateDecision::Public => next.run(request).await,
        GateDecision::Allow => {
            if let Some(session) = session {
                let headers = request.headers_mut();
                if let Ok(value) = HeaderValue::from_str(&session.id) {
                    headers.insert(USER_ID_HEADER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&session.username) {
                    headers.insert(USERNAME_HEADER, value);
                }
                request.extensions_mut().insert(session);
            }
            next.run(request).await
        }
        GateDecision::RejectUnauthenticated => clearing_cookie(
            &state,
            AppError::Unauthorized("Not authenticated".into()).into_response(),
        ),
        GateDecision::RedirectToLogin { target } => clearing_cookie(
            &state,
            Redirect::temporary(&login_url(&target)).into_response(),
        ),
        GateDecision::RedirectToChangePassword => {
            Redirect::temporary(CHANGE_PASSWORD_PAGE).into_response()
        }
        GateDecision::RejectPasswordChange => AppError::PasswordChangeRequired.into_response(),
        GateDecision::RedirectHome => Redirect::temporary(HOME_PAGE).into_response(),
        GateDecision::RejectForbidden => {
            AppError::Forbidden("Admin access required".into()).into_response()
        }
    }
}
