//! Stock ledger mutations for receipt lines
//!
//! A line's ledger effect is planned once from the product's tracking type
//! and then applied forward on confirm or backward on cancel. All writes go
//! through the bucket key or the serial numbers, never through a row read
//! earlier.

use shared::{BucketKey, Product, ReceiptLine, SerialUnit, StockMovement, TrackingType};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::StockLedgerStore;

/// Work out what a line does to the ledger of `warehouse_id`
pub fn plan_movement(product: &Product, warehouse_id: Uuid, line: &ReceiptLine) -> StockMovement {
    match product.tracking_type {
        TrackingType::Serialized => StockMovement::Serial {
            warehouse_id,
            units: line
                .serial_numbers
                .iter()
                .flatten()
                .map(|serial_number| SerialUnit {
                    product_id: line.product_id,
                    warehouse_id,
                    serial_number: serial_number.clone(),
                })
                .collect(),
        },
        TrackingType::Bulk | TrackingType::LotTracked | TrackingType::Expirable => {
            StockMovement::Bucket {
                key: BucketKey {
                    product_id: line.product_id,
                    warehouse_id,
                    lot_code: line.lot_code.clone(),
                    expiration_date: line.expiration_date,
                },
                quantity: line.quantity,
            }
        }
    }
}

/// Apply a movement on confirm
pub async fn increment<S: StockLedgerStore>(
    store: &S,
    tx: &mut S::Tx,
    movement: &StockMovement,
) -> AppResult<()> {
    match movement {
        StockMovement::Serial { units, .. } => store.insert_serial_units(tx, units).await,
        StockMovement::Bucket { key, quantity } => {
            let balance = store.upsert_bucket(tx, key, *quantity).await?;
            tracing::debug!(
                product_id = %key.product_id,
                warehouse_id = %key.warehouse_id,
                balance,
                "bucket incremented"
            );
            Ok(())
        }
    }
}

/// Undo a movement on cancel.
///
/// Fails with `InvalidState` when the stock the movement created is no longer
/// all there.
pub async fn decrement<S: StockLedgerStore>(
    store: &S,
    tx: &mut S::Tx,
    movement: &StockMovement,
) -> AppResult<()> {
    match movement {
        StockMovement::Serial {
            warehouse_id,
            units,
        } => {
            let serials = movement.serial_numbers();
            let removed = store.delete_by_serials(tx, *warehouse_id, &serials).await?;
            if removed != units.len() as u64 {
                return Err(AppError::insufficient_stock(format!(
                    "{} of {} serialized units are still in warehouse \"{}\"",
                    removed,
                    units.len(),
                    warehouse_id
                )));
            }
            Ok(())
        }
        StockMovement::Bucket { key, quantity } => {
            let on_hand = store
                .get_bucket(tx, key)
                .await?
                .map(|row| row.quantity)
                .unwrap_or(0);
            if on_hand < *quantity {
                return Err(AppError::insufficient_stock(format!(
                    "product \"{}\" has {} on hand, {} needed",
                    key.product_id, on_hand, quantity
                )));
            }

            let balance = store.decrement_bucket(tx, key, *quantity).await?;
            if balance == 0 {
                store.delete_by_key(tx, key).await?;
            }
            tracing::debug!(
                product_id = %key.product_id,
                warehouse_id = %key.warehouse_id,
                balance,
                "bucket decremented"
            );
            Ok(())
        }
    }
}
