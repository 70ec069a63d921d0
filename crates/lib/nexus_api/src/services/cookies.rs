//! Session cookie construction.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "nexus_token";

/// httpOnly session cookie living as long as the token.
///
/// Login uses `SameSite::Lax` so a cross-site redirect into the login flow
/// still carries the cookie back; everything else uses `Strict`.
pub fn session_cookie(
    token: &str,
    max_age_secs: i64,
    secure: bool,
    same_site: SameSite,
) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .path("/".to_string())
        .max_age(Duration::seconds(max_age_secs))
        .build()
}

/// Expired cookie that makes the browser drop the session.
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE.to_string(), String::new()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}
