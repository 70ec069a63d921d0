//! Authorization decisions over a resolved session.
//!
//! Callers get an explicit outcome instead of matching on error strings.

use crate::models::auth::SessionUser;

/// What a caller needs from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement<'a> {
    /// Any valid session.
    Authenticated,
    /// A session with the admin flag.
    Admin,
    /// A session whose token snapshot lists this application slug.
    App(&'a str),
}

/// Outcome of [`authorize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Granted(SessionUser),
    /// No valid session.
    Unauthorized,
    /// Valid session lacking the required role or grant.
    Forbidden,
}

/// Decide whether `session` satisfies `requirement`. Token-only; no store access.
pub fn authorize(session: Option<SessionUser>, requirement: Requirement<'_>) -> Authorization {
    let Some(session) = session else {
        return Authorization::Unauthorized;
    };
    let allowed = match requirement {
        Requirement::Authenticated => true,
        Requirement::Admin => session.is_admin,
        Requirement::App(slug) => session.has_app(slug),
    };
    if allowed {
        Authorization::Granted(session)
    } else {
        Authorization::Forbidden
    }
}
