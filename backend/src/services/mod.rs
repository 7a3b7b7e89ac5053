//! Business logic services for Stockroom

pub mod ledger;
pub mod receipt;
pub mod retry;

pub use receipt::{ReceiptOperations, ReceiptService};
pub use retry::retry_on_conflict;
