//! In-process storage backend
//!
//! A unit of work owns the single state lock for its whole lifetime, which
//! makes every transaction serializable. The state is snapshotted when the
//! lock is taken and put back on drop unless the unit of work committed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shared::{BucketKey, Product, PurchaseReceipt, SerialUnit, StockBalance};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{ProductRegistry, ReceiptRepository, StockLedgerStore, Transactional};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    receipts: HashMap<Uuid, PurchaseReceipt>,
    buckets: HashMap<BucketKey, StockBalance>,
    serials: HashMap<String, StockBalance>,
}

/// Storage that keeps products, receipts and the ledger in memory
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
}

/// Unit of work for [`MemoryStore`]
pub struct MemoryTx {
    state: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.state = snapshot;
        }
    }
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout,
        }
    }

    /// Register a product, as the product service would
    pub async fn insert_product(&self, product: Product) -> AppResult<Product> {
        let mut tx = self.begin().await?;
        tx.state.products.insert(product.id, product.clone());
        self.commit(tx).await?;
        Ok(product)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Transactional for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> AppResult<MemoryTx> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                AppError::Conflict(format!(
                    "ledger lock not acquired within {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;
        let snapshot = guard.clone();
        Ok(MemoryTx {
            state: guard,
            snapshot: Some(snapshot),
        })
    }

    async fn commit(&self, mut tx: MemoryTx) -> AppResult<()> {
        tx.snapshot = None;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ProductRegistry for MemoryStore {
    async fn get_product(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<Product> {
        tx.state
            .products
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Product \"{}\"", id)))
    }

    async fn mark_used(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<()> {
        let product = tx
            .state
            .products
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Product \"{}\"", id)))?;
        if !product.is_used {
            product.is_used = true;
            product.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl StockLedgerStore for MemoryStore {
    async fn upsert_bucket(&self, tx: &mut MemoryTx, key: &BucketKey, quantity: i64) -> AppResult<i64> {
        let row = tx
            .state
            .buckets
            .entry(key.clone())
            .or_insert_with(|| StockBalance::bucket(key));
        row.quantity += quantity;
        Ok(row.quantity)
    }

    async fn decrement_bucket(&self, tx: &mut MemoryTx, key: &BucketKey, quantity: i64) -> AppResult<i64> {
        let row = tx.state.buckets.get_mut(key).ok_or_else(|| {
            AppError::insufficient_stock(format!("no bucket for product \"{}\"", key.product_id))
        })?;
        if row.quantity < quantity {
            return Err(AppError::insufficient_stock(format!(
                "product \"{}\" has {} in bucket",
                key.product_id, row.quantity
            )));
        }
        row.quantity -= quantity;
        Ok(row.quantity)
    }

    async fn insert_serial_units(&self, tx: &mut MemoryTx, units: &[SerialUnit]) -> AppResult<()> {
        let mut seen = std::collections::HashSet::new();
        for unit in units {
            if tx.state.serials.contains_key(&unit.serial_number)
                || !seen.insert(unit.serial_number.as_str())
            {
                return Err(AppError::duplicate_serial(Some(&unit.serial_number)));
            }
        }
        for unit in units {
            tx.state
                .serials
                .insert(unit.serial_number.clone(), StockBalance::serial(unit));
        }
        Ok(())
    }

    async fn delete_by_key(&self, tx: &mut MemoryTx, key: &BucketKey) -> AppResult<()> {
        tx.state.buckets.remove(key);
        Ok(())
    }

    async fn delete_by_serials(
        &self,
        tx: &mut MemoryTx,
        warehouse_id: Uuid,
        serials: &[String],
    ) -> AppResult<u64> {
        let mut removed = 0;
        for serial in serials {
            let in_warehouse = tx
                .state
                .serials
                .get(serial)
                .map(|row| row.warehouse_id == warehouse_id)
                .unwrap_or(false);
            if in_warehouse {
                tx.state.serials.remove(serial);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn get_bucket(&self, tx: &mut MemoryTx, key: &BucketKey) -> AppResult<Option<StockBalance>> {
        Ok(tx.state.buckets.get(key).cloned())
    }

    async fn list_balances(
        &self,
        tx: &mut MemoryTx,
        product_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockBalance>> {
        let wanted = |row: &&StockBalance| {
            row.product_id == product_id && warehouse_id.map_or(true, |w| row.warehouse_id == w)
        };
        let mut rows: Vec<StockBalance> = tx
            .state
            .buckets
            .values()
            .chain(tx.state.serials.values())
            .filter(wanted)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (a.warehouse_id, &a.lot_code, a.expiration_date, &a.serial_number).cmp(&(
                b.warehouse_id,
                &b.lot_code,
                b.expiration_date,
                &b.serial_number,
            ))
        });
        Ok(rows)
    }
}

#[async_trait]
impl ReceiptRepository for MemoryStore {
    async fn insert_receipt(
        &self,
        tx: &mut MemoryTx,
        receipt: &PurchaseReceipt,
    ) -> AppResult<PurchaseReceipt> {
        if tx.state.receipts.contains_key(&receipt.id) {
            return Err(AppError::Internal(format!(
                "Purchase Receipt \"{}\" already exists",
                receipt.id
            )));
        }
        tx.state.receipts.insert(receipt.id, receipt.clone());
        Ok(receipt.clone())
    }

    async fn load_receipt(&self, tx: &mut MemoryTx, id: Uuid) -> AppResult<PurchaseReceipt> {
        tx.state
            .receipts
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Purchase Receipt \"{}\"", id)))
    }

    async fn save_receipt_status(
        &self,
        tx: &mut MemoryTx,
        receipt: &PurchaseReceipt,
    ) -> AppResult<PurchaseReceipt> {
        let stored = tx
            .state
            .receipts
            .get_mut(&receipt.id)
            .ok_or_else(|| AppError::NotFound(format!("Purchase Receipt \"{}\"", receipt.id)))?;
        stored.status = receipt.status;
        stored.cancellation_reason = receipt.cancellation_reason.clone();
        stored.updated_at = receipt.updated_at;
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::TrackingType;

    #[tokio::test]
    async fn test_dropped_tx_rolls_back() {
        let store = MemoryStore::default();
        let key = BucketKey::new(Uuid::new_v4(), Uuid::new_v4());

        let mut tx = store.begin().await.unwrap();
        store.upsert_bucket(&mut tx, &key, 5).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(store.get_bucket(&mut tx, &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let store = MemoryStore::default();
        let key = BucketKey::new(Uuid::new_v4(), Uuid::new_v4()).with_lot("L1");

        let mut tx = store.begin().await.unwrap();
        assert_eq!(store.upsert_bucket(&mut tx, &key, 5).await.unwrap(), 5);
        assert_eq!(store.upsert_bucket(&mut tx, &key, 3).await.unwrap(), 8);
        store.commit(tx).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let row = store.get_bucket(&mut tx, &key).await.unwrap().unwrap();
        assert_eq!(row.quantity, 8);
        assert_eq!(row.lot_code.as_deref(), Some("L1"));
    }

    #[tokio::test]
    async fn test_bucket_never_goes_negative() {
        let store = MemoryStore::default();
        let key = BucketKey::new(Uuid::new_v4(), Uuid::new_v4());
        let mut tx = store.begin().await.unwrap();
        store.upsert_bucket(&mut tx, &key, 2).await.unwrap();
        let err = store.decrement_bucket(&mut tx, &key, 3).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert_eq!(store.decrement_bucket(&mut tx, &key, 2).await.unwrap(), 0);

        let missing = BucketKey::new(Uuid::new_v4(), Uuid::new_v4());
        let err = store.decrement_bucket(&mut tx, &missing, 1).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(store.get_bucket(&mut tx, &missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_serials_rejected() {
        let store = MemoryStore::default();
        let product_id = Uuid::new_v4();
        let warehouse_id = Uuid::new_v4();
        let unit = |sn: &str| SerialUnit {
            product_id,
            warehouse_id,
            serial_number: sn.to_string(),
        };

        let mut tx = store.begin().await.unwrap();
        let err = store
            .insert_serial_units(&mut tx, &[unit("A"), unit("A")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("duplicate serial number"));

        store.insert_serial_units(&mut tx, &[unit("A")]).await.unwrap();
        let err = store
            .insert_serial_units(&mut tx, &[unit("B"), unit("A")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        // The failed batch must not leave "B" behind
        let rows = store.list_balances(&mut tx, product_id, None).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_serials_respects_warehouse() {
        let store = MemoryStore::default();
        let product_id = Uuid::new_v4();
        let warehouse_id = Uuid::new_v4();
        let mut tx = store.begin().await.unwrap();
        store
            .insert_serial_units(
                &mut tx,
                &[SerialUnit {
                    product_id,
                    warehouse_id,
                    serial_number: "SN9".to_string(),
                }],
            )
            .await
            .unwrap();

        let serials = vec!["SN9".to_string()];
        assert_eq!(store.delete_by_serials(&mut tx, Uuid::new_v4(), &serials).await.unwrap(), 0);
        assert_eq!(store.delete_by_serials(&mut tx, warehouse_id, &serials).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mark_used_is_idempotent() {
        let store = MemoryStore::default();
        let product = store
            .insert_product(Product::new("Bolt", "B-1", TrackingType::Bulk))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        store.mark_used(&mut tx, product.id).await.unwrap();
        store.mark_used(&mut tx, product.id).await.unwrap();
        assert!(store.get_product(&mut tx, product.id).await.unwrap().is_used);

        let err = store.mark_used(&mut tx, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_lock_timeout_is_a_conflict() {
        let store = MemoryStore::new(Duration::from_millis(10));
        let _held = store.begin().await.unwrap();
        let err = store.begin().await.err().unwrap();
        assert!(err.is_retryable());
    }
}
