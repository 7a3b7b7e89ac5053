//! Stock ledger models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a non-serialized stock row.
///
/// `None` lot code or expiration date is a value of its own: a bucket with no
/// lot never matches a bucket with lot "A".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub lot_code: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

impl BucketKey {
    pub fn new(product_id: Uuid, warehouse_id: Uuid) -> Self {
        Self {
            product_id,
            warehouse_id,
            lot_code: None,
            expiration_date: None,
        }
    }

    pub fn with_lot(mut self, lot_code: impl Into<String>) -> Self {
        self.lot_code = Some(lot_code.into());
        self
    }

    pub fn with_expiration(mut self, expiration_date: NaiveDate) -> Self {
        self.expiration_date = Some(expiration_date);
        self
    }
}

/// A single serialized unit about to enter the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialUnit {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub serial_number: String,
}

/// A row of the stock ledger: either a bucket or one serialized unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub id: Uuid,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    /// Never negative; always 1 for a serialized unit
    pub quantity: i64,
    pub lot_code: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub serial_number: Option<String>,
}

impl StockBalance {
    /// An empty bucket row for `key`
    pub fn bucket(key: &BucketKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity: 0,
            lot_code: key.lot_code.clone(),
            expiration_date: key.expiration_date,
            serial_number: None,
        }
    }

    pub fn serial(unit: &SerialUnit) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: unit.product_id,
            warehouse_id: unit.warehouse_id,
            quantity: 1,
            lot_code: None,
            expiration_date: None,
            serial_number: Some(unit.serial_number.clone()),
        }
    }

    pub fn is_serialized(&self) -> bool {
        self.serial_number.is_some()
    }
}

/// The ledger effect of one confirmed receipt line.
///
/// Confirm applies it forward, cancel applies it in reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockMovement {
    Bucket { key: BucketKey, quantity: i64 },
    Serial { warehouse_id: Uuid, units: Vec<SerialUnit> },
}

impl StockMovement {
    /// Total units this movement adds on confirm
    pub fn quantity(&self) -> i64 {
        match self {
            StockMovement::Bucket { quantity, .. } => *quantity,
            StockMovement::Serial { units, .. } => units.len() as i64,
        }
    }

    pub fn serial_numbers(&self) -> Vec<String> {
        match self {
            StockMovement::Bucket { .. } => Vec::new(),
            StockMovement::Serial { units, .. } => {
                units.iter().map(|u| u.serial_number.clone()).collect()
            }
        }
    }
}
