//! Domain models shared by the store backends, the flows and the HTTP layer.

pub mod apps;
pub mod audit;
pub mod auth;
