//! Domain models for Stockroom
//!
//! Re-exports models from the shared crate so the browser validator and the
//! server agree on every shape

pub use shared::models::*;
