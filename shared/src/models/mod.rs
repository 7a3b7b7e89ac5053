//! Domain models for the stock ledger

mod product;
mod receipt;
mod stock;

pub use product::*;
pub use receipt::*;
pub use stock::*;
