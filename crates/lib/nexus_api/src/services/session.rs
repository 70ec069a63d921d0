//! Session resolution: request cookie to typed session.
//!
//! Token-only. No store access happens on this path.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::CookieJar;
use nexus_core::auth::jwt::TokenService;
use nexus_core::models::auth::SessionUser;

use super::cookies::SESSION_COOKIE;

/// Outcome of looking for a session on a request.
///
/// Callers must treat `Absent` and `Invalid` the same way towards the
/// client; the distinction only exists for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLookup {
    Absent,
    Invalid,
    Valid(SessionUser),
}

impl SessionLookup {
    pub fn into_session(self) -> Option<SessionUser> {
        match self {
            SessionLookup::Valid(session) => Some(session),
            SessionLookup::Absent | SessionLookup::Invalid => None,
        }
    }
}

/// Resolve the session cookie in `headers`, if any.
pub fn resolve(headers: &HeaderMap, tokens: &TokenService) -> SessionLookup {
    let jar = CookieJar::from_headers(headers);
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return SessionLookup::Absent;
    };
    match tokens.verify(cookie.value()) {
        Some(claims) => SessionLookup::Valid(claims.into()),
        None => SessionLookup::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use chrono::Duration;

    fn tokens() -> TokenService {
        TokenService::new(b"session-resolver-test-secret-0123456789", Duration::hours(1))
    }

    fn session() -> SessionUser {
        SessionUser {
            id: "u1".into(),
            username: "alice".into(),
            name: Some("Alice".into()),
            is_admin: false,
            must_change_password: false,
            apps: vec!["wiki".into()],
        }
    }

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie.parse().unwrap());
        headers
    }

    #[test]
    fn no_cookie_is_absent() {
        assert_eq!(resolve(&HeaderMap::new(), &tokens()), SessionLookup::Absent);
        assert_eq!(resolve(&headers("other=1"), &tokens()), SessionLookup::Absent);
    }

    #[test]
    fn garbage_cookie_is_invalid() {
        let lookup = resolve(&headers("nexus_token=not.a.jwt"), &tokens());
        assert_eq!(lookup, SessionLookup::Invalid);
        assert_eq!(lookup.into_session(), None);
    }

    #[test]
    fn minted_token_projects_session() {
        let tokens = tokens();
        let token = tokens.mint(&session()).unwrap();
        let lookup = resolve(&headers(&format!("a=b; nexus_token={token}")), &tokens);
        assert_eq!(lookup.into_session(), Some(session()));
    }
}
