//! Request middleware and extractors.

pub mod extract;
pub mod gate;
