//! Shared types and models for Stockroom
//!
//! This crate contains the domain model and the pure validation rules shared
//! between the backend and the browser (via WASM).

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::*;
