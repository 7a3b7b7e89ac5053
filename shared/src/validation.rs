//! Validation rules for stock-bearing documents
//!
//! Everything here is pure: the same product and line always give the same
//! answer, and nothing is written anywhere.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{Product, ReceiptLine, TrackingType};

// ============================================================================
// Tracking Policy
// ============================================================================

/// A receipt line that does not satisfy its product's tracking policy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingViolation {
    #[error("Product \"{name}\" is a variant parent and cannot receive stock directly")]
    VariantParent { product_id: Uuid, name: String },

    #[error("Expiration date required for expirable product \"{name}\"")]
    MissingExpirationDate { product_id: Uuid, name: String },

    #[error("Lot code required for lot-tracked product \"{name}\"")]
    MissingLotCode { product_id: Uuid, name: String },

    #[error("Serial numbers count ({actual}) must match quantity ({expected}) for \"{name}\"")]
    SerialCountMismatch {
        product_id: Uuid,
        name: String,
        expected: i64,
        actual: usize,
    },
}

impl TrackingViolation {
    /// The receipt line field the violation is about
    pub fn field(&self) -> &'static str {
        match self {
            TrackingViolation::VariantParent { .. } => "product_id",
            TrackingViolation::MissingExpirationDate { .. } => "expiration_date",
            TrackingViolation::MissingLotCode { .. } => "lot_code",
            TrackingViolation::SerialCountMismatch { .. } => "serial_numbers",
        }
    }
}

/// Check a receipt line against the tracking rules of its product
pub fn validate_tracking(product: &Product, line: &ReceiptLine) -> Result<(), TrackingViolation> {
    if product.is_variant_parent {
        return Err(TrackingViolation::VariantParent {
            product_id: product.id,
            name: product.name.clone(),
        });
    }

    match product.tracking_type {
        TrackingType::Bulk => Ok(()),
        TrackingType::Expirable => {
            if line.expiration_date.is_none() {
                return Err(TrackingViolation::MissingExpirationDate {
                    product_id: product.id,
                    name: product.name.clone(),
                });
            }
            Ok(())
        }
        TrackingType::LotTracked => {
            let has_lot = line
                .lot_code
                .as_deref()
                .map(|lot| !lot.trim().is_empty())
                .unwrap_or(false);
            if !has_lot {
                return Err(TrackingViolation::MissingLotCode {
                    product_id: product.id,
                    name: product.name.clone(),
                });
            }
            Ok(())
        }
        TrackingType::Serialized => {
            let actual = line.serial_numbers.as_ref().map(Vec::len).unwrap_or(0);
            if line.serial_numbers.is_none() || actual as i64 != line.quantity {
                return Err(TrackingViolation::SerialCountMismatch {
                    product_id: product.id,
                    name: product.name.clone(),
                    expected: line.quantity,
                    actual,
                });
            }
            Ok(())
        }
    }
}

// ============================================================================
// Product Lock
// ============================================================================

/// An edit that the `is_used` lock forbids
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductLockViolation {
    #[error("Cannot change SKU for product \"{product_id}\" because it is already used in transactions")]
    SkuLocked { product_id: Uuid },

    #[error("Cannot change tracking type for product \"{product_id}\" because it is already used in transactions")]
    TrackingTypeLocked { product_id: Uuid },
}

/// Reject SKU or tracking type changes once a product has been received.
///
/// `None` means the field is not being changed. SKUs compare upper-cased and
/// trimmed, the same way they are stored.
pub fn check_product_lock(
    product: &Product,
    new_sku: Option<&str>,
    new_tracking_type: Option<TrackingType>,
) -> Result<(), ProductLockViolation> {
    if !product.is_used {
        return Ok(());
    }
    if let Some(tracking_type) = new_tracking_type {
        if tracking_type != product.tracking_type {
            return Err(ProductLockViolation::TrackingTypeLocked {
                product_id: product.id,
            });
        }
    }
    if let Some(sku) = new_sku {
        if sku.trim().to_uppercase() != product.sku {
            return Err(ProductLockViolation::SkuLocked {
                product_id: product.id,
            });
        }
    }
    Ok(())
}
