//! HTTP request handlers

pub mod health;
pub mod receipt;
pub mod stock;

pub use health::*;
pub use receipt::*;
pub use stock::*;
