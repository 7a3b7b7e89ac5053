//! Product models as seen by the stock ledger

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a product's stock must be recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingType {
    /// Plain quantity, no extra identification
    Bulk,
    LotTracked,
    Expirable,
    /// One ledger row per unit, keyed by serial number
    Serialized,
}

impl TrackingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingType::Bulk => "BULK",
            TrackingType::LotTracked => "LOT_TRACKED",
            TrackingType::Expirable => "EXPIRABLE",
            TrackingType::Serialized => "SERIALIZED",
        }
    }

    /// Whether stock of this type lives in quantity buckets rather than unit rows
    pub fn is_bucketed(&self) -> bool {
        !matches!(self, TrackingType::Serialized)
    }
}

impl fmt::Display for TrackingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BULK" => Ok(TrackingType::Bulk),
            "LOT_TRACKED" => Ok(TrackingType::LotTracked),
            "EXPIRABLE" => Ok(TrackingType::Expirable),
            "SERIALIZED" => Ok(TrackingType::Serialized),
            other => Err(format!("unknown tracking type `{}`", other)),
        }
    }
}

/// A purchasable product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Upper-case, unique; frozen once `is_used` is set
    pub sku: String,
    pub unit_of_measure: String,
    pub category_id: Option<Uuid>,
    pub tracking_type: TrackingType,
    /// Family head; only its variants can hold stock
    pub is_variant_parent: bool,
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub variant_attributes: HashMap<String, String>,
    /// Set by the first confirmed receipt that references the product
    pub is_used: bool,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Build an active, unused product with the given tracking policy
    pub fn new(name: impl Into<String>, sku: impl Into<String>, tracking_type: TrackingType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sku: sku.into().trim().to_uppercase(),
            unit_of_measure: "pcs".to_string(),
            category_id: None,
            tracking_type,
            is_variant_parent: false,
            parent_id: None,
            variant_attributes: HashMap::new(),
            is_used: false,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a variant belonging to this product family
    pub fn variant_of(parent: &Product, name: impl Into<String>, sku: impl Into<String>) -> Self {
        let mut variant = Product::new(name, sku, parent.tracking_type);
        variant.parent_id = Some(parent.id);
        variant.unit_of_measure = parent.unit_of_measure.clone();
        variant.category_id = parent.category_id;
        variant
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}
