//! Storage contracts for the receipt engine
//!
//! Every collaborator call takes the unit of work (`Tx`) explicitly. A unit
//! of work that is dropped without [`Transactional::commit`] rolls back, so an
//! early `?` return never leaves partial writes behind.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use shared::{BucketKey, Product, PurchaseReceipt, SerialUnit, StockBalance};
use uuid::Uuid;

use crate::error::AppResult;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Source of units of work
#[async_trait]
pub trait Transactional: Send + Sync + 'static {
    type Tx: Send;

    /// Open a unit of work
    async fn begin(&self) -> AppResult<Self::Tx>;

    /// Make every write done through `tx` visible at once
    async fn commit(&self, tx: Self::Tx) -> AppResult<()>;

    /// Check that the backing store is reachable
    async fn ping(&self) -> AppResult<()>;
}

/// Read access to products plus the one write the ledger needs
#[async_trait]
pub trait ProductRegistry: Transactional {
    /// Fetch a product, soft-deleted ones included. `NotFound` if missing.
    async fn get_product(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<Product>;

    /// Set `is_used`. Idempotent.
    async fn mark_used(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<()>;
}

/// Keyed storage of stock quantities
#[async_trait]
pub trait StockLedgerStore: Transactional {
    /// Add `quantity` to the bucket, creating it if absent. Returns the new
    /// quantity.
    async fn upsert_bucket(&self, tx: &mut Self::Tx, key: &BucketKey, quantity: i64)
        -> AppResult<i64>;

    /// Take `quantity` out of an existing bucket. Returns the new quantity.
    ///
    /// A missing bucket, or one holding less than `quantity`, fails with
    /// `InvalidState` and leaves the bucket unchanged.
    async fn decrement_bucket(&self, tx: &mut Self::Tx, key: &BucketKey, quantity: i64)
        -> AppResult<i64>;

    /// Insert one row per unit. Any serial already in the ledger (or repeated
    /// within `units`) fails the whole call with a duplicate-serial error.
    async fn insert_serial_units(&self, tx: &mut Self::Tx, units: &[SerialUnit]) -> AppResult<()>;

    async fn delete_by_key(&self, tx: &mut Self::Tx, key: &BucketKey) -> AppResult<()>;

    /// Remove the units with these serials in `warehouse_id`. Returns how many
    /// rows were removed.
    async fn delete_by_serials(
        &self,
        tx: &mut Self::Tx,
        warehouse_id: Uuid,
        serials: &[String],
    ) -> AppResult<u64>;

    /// Read a bucket, locking it against concurrent writers until `tx` ends
    async fn get_bucket(&self, tx: &mut Self::Tx, key: &BucketKey)
        -> AppResult<Option<StockBalance>>;

    /// All rows for a product, optionally within one warehouse
    async fn list_balances(
        &self,
        tx: &mut Self::Tx,
        product_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockBalance>>;
}

/// Durable storage of receipt documents
#[async_trait]
pub trait ReceiptRepository: Transactional {
    async fn insert_receipt(
        &self,
        tx: &mut Self::Tx,
        receipt: &PurchaseReceipt,
    ) -> AppResult<PurchaseReceipt>;

    /// Load a receipt, locking it until `tx` ends. `NotFound` if missing.
    async fn load_receipt(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<PurchaseReceipt>;

    /// Persist status, cancellation reason and `updated_at`. Lines are never
    /// rewritten.
    async fn save_receipt_status(
        &self,
        tx: &mut Self::Tx,
        receipt: &PurchaseReceipt,
    ) -> AppResult<PurchaseReceipt>;
}

/// Everything the receipt engine needs, behind one unit of work
pub trait InventoryStore: ProductRegistry + StockLedgerStore + ReceiptRepository {}

impl<T> InventoryStore for T where T: ProductRegistry + StockLedgerStore + ReceiptRepository {}
