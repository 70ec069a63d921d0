//! Business logic behind the handlers.

pub mod apps;
pub mod auth;
pub mod cookies;
pub mod session;
pub mod users;
