//! Purchase receipt lifecycle: draft, confirm, cancel
//!
//! Confirm and cancel each run inside one unit of work that covers the
//! receipt, every product `is_used` flag and every ledger row they touch. Any
//! error returns before commit, and dropping the unit of work undoes every
//! write made so far.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    validate_tracking, CreatePurchaseReceipt, PurchaseReceipt, ReceiptStatus, StockBalance,
    TrackingViolation,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::ledger;
use crate::store::InventoryStore;

/// Receipt engine over a storage backend
pub struct ReceiptService<S> {
    store: Arc<S>,
}

impl<S> Clone for ReceiptService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

/// Tracking violation on the line at `position`
fn line_violation(position: usize, violation: TrackingViolation) -> AppError {
    AppError::Validation {
        field: format!("lines[{}].{}", position, violation.field()),
        message: violation.to_string(),
    }
}

impl<S: InventoryStore> ReceiptService<S> {
    /// Create a new ReceiptService instance
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a new DRAFT receipt. No stock or product impact.
    pub async fn create(&self, input: CreatePurchaseReceipt) -> AppResult<PurchaseReceipt> {
        input.validate()?;
        let receipt = PurchaseReceipt::draft(input);

        let mut tx = self.store.begin().await?;
        let created = self.store.insert_receipt(&mut tx, &receipt).await?;
        self.store.commit(tx).await?;

        tracing::info!(
            receipt_id = %created.id,
            lines = created.lines.len(),
            "purchase receipt drafted"
        );
        Ok(created)
    }

    /// Get a receipt by ID
    pub async fn find(&self, id: Uuid) -> AppResult<PurchaseReceipt> {
        let mut tx = self.store.begin().await?;
        let receipt = self.store.load_receipt(&mut tx, id).await?;
        self.store.commit(tx).await?;
        Ok(receipt)
    }

    /// Validate tracking rules, lock products, add stock and freeze the receipt
    pub async fn confirm(&self, id: Uuid) -> AppResult<PurchaseReceipt> {
        let mut tx = self.store.begin().await?;

        let mut receipt = self.store.load_receipt(&mut tx, id).await?;
        if !receipt.status.can_transition_to(ReceiptStatus::Confirmed) {
            return Err(AppError::InvalidState(format!(
                "Receipt \"{}\" is already {}",
                id, receipt.status
            )));
        }

        for (position, line) in receipt.lines.iter().enumerate() {
            let product = self.store.get_product(&mut tx, line.product_id).await?;
            if product.is_deleted() {
                return Err(AppError::NotFound(format!("Product \"{}\"", line.product_id)));
            }

            validate_tracking(&product, line).map_err(|v| line_violation(position, v))?;

            self.store.mark_used(&mut tx, product.id).await?;

            let movement = ledger::plan_movement(&product, receipt.warehouse_id, line);
            ledger::increment(self.store.as_ref(), &mut tx, &movement).await?;

            tracing::debug!(
                receipt_id = %id,
                position,
                product_id = %product.id,
                tracking_type = %product.tracking_type,
                quantity = movement.quantity(),
                "receipt line applied"
            );
        }

        receipt.status = ReceiptStatus::Confirmed;
        receipt.updated_at = Utc::now();
        let confirmed = self.store.save_receipt_status(&mut tx, &receipt).await?;

        self.store.commit(tx).await?;

        tracing::info!(
            receipt_id = %id,
            warehouse_id = %confirmed.warehouse_id,
            total_quantity = confirmed.total_quantity(),
            "purchase receipt confirmed"
        );
        Ok(confirmed)
    }

    /// Revert the stock a confirmed receipt added and close it for good.
    ///
    /// Products keep their `is_used` flag.
    pub async fn cancel(&self, id: Uuid, reason: &str) -> AppResult<PurchaseReceipt> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Validation {
                field: "reason".to_string(),
                message: format!("Cancellation reason is required for Receipt \"{}\"", id),
            });
        }

        let mut tx = self.store.begin().await?;

        let mut receipt = self.store.load_receipt(&mut tx, id).await?;
        if !receipt.status.can_transition_to(ReceiptStatus::Cancelled) {
            return Err(AppError::InvalidState(format!(
                "Only CONFIRMED receipts can be cancelled. Status is: {}",
                receipt.status
            )));
        }

        for (position, line) in receipt.lines.iter().enumerate() {
            // Soft-deleted products still own the stock they were received into
            let product = self.store.get_product(&mut tx, line.product_id).await?;

            let movement = ledger::plan_movement(&product, receipt.warehouse_id, line);
            ledger::decrement(self.store.as_ref(), &mut tx, &movement).await?;

            tracing::debug!(
                receipt_id = %id,
                position,
                product_id = %product.id,
                quantity = movement.quantity(),
                "receipt line reverted"
            );
        }

        receipt.status = ReceiptStatus::Cancelled;
        receipt.cancellation_reason = Some(reason.to_string());
        receipt.updated_at = Utc::now();
        let cancelled = self.store.save_receipt_status(&mut tx, &receipt).await?;

        self.store.commit(tx).await?;

        tracing::info!(receipt_id = %id, reason, "purchase receipt cancelled");
        Ok(cancelled)
    }

    /// Ledger rows of a product, optionally limited to one warehouse
    pub async fn stock_for_product(
        &self,
        product_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockBalance>> {
        let mut tx = self.store.begin().await?;
        let product = self.store.get_product(&mut tx, product_id).await?;
        if product.is_deleted() {
            return Err(AppError::NotFound(format!("Product \"{}\"", product_id)));
        }
        let balances = self
            .store
            .list_balances(&mut tx, product_id, warehouse_id)
            .await?;
        self.store.commit(tx).await?;
        Ok(balances)
    }
}

/// Object-safe face of the receipt engine, shared with HTTP handlers
#[async_trait]
pub trait ReceiptOperations: Send + Sync {
    async fn create(&self, input: CreatePurchaseReceipt) -> AppResult<PurchaseReceipt>;

    async fn find(&self, id: Uuid) -> AppResult<PurchaseReceipt>;

    async fn confirm(&self, id: Uuid) -> AppResult<PurchaseReceipt>;

    async fn cancel(&self, id: Uuid, reason: &str) -> AppResult<PurchaseReceipt>;

    async fn stock_for_product(
        &self,
        product_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockBalance>>;

    /// Storage connectivity
    async fn health(&self) -> AppResult<()>;
}

#[async_trait]
impl<S: InventoryStore> ReceiptOperations for ReceiptService<S> {
    async fn create(&self, input: CreatePurchaseReceipt) -> AppResult<PurchaseReceipt> {
        ReceiptService::create(self, input).await
    }

    async fn find(&self, id: Uuid) -> AppResult<PurchaseReceipt> {
        ReceiptService::find(self, id).await
    }

    async fn confirm(&self, id: Uuid) -> AppResult<PurchaseReceipt> {
        ReceiptService::confirm(self, id).await
    }

    async fn cancel(&self, id: Uuid, reason: &str) -> AppResult<PurchaseReceipt> {
        ReceiptService::cancel(self, id, reason).await
    }

    async fn stock_for_product(
        &self,
        product_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockBalance>> {
        ReceiptService::stock_for_product(self, product_id, warehouse_id).await
    }

    async fn health(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
