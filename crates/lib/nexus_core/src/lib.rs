//! # nexus_core
//!
//! Core domain logic for Nexus: session tokens, access grants, login rate
//! limiting, password policy and the audit trail.

pub mod access;
pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod migrate;
pub mod models;
pub mod store;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
