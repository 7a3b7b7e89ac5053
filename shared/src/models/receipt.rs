//! Purchase receipt models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Lifecycle status of a purchase receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceiptStatus {
    Draft,
    Confirmed,
    Cancelled,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Draft => "DRAFT",
            ReceiptStatus::Confirmed => "CONFIRMED",
            ReceiptStatus::Cancelled => "CANCELLED",
        }
    }

    /// Valid transitions: DRAFT -> CONFIRMED -> CANCELLED
    pub fn can_transition_to(&self, next: ReceiptStatus) -> bool {
        matches!(
            (self, next),
            (ReceiptStatus::Draft, ReceiptStatus::Confirmed)
                | (ReceiptStatus::Confirmed, ReceiptStatus::Cancelled)
        )
    }
}

impl fmt::Display for ReceiptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReceiptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(ReceiptStatus::Draft),
            "CONFIRMED" => Ok(ReceiptStatus::Confirmed),
            "CANCELLED" => Ok(ReceiptStatus::Cancelled),
            other => Err(format!("unknown receipt status `{}`", other)),
        }
    }
}

/// One delivered product on a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub lot_code: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub serial_numbers: Option<Vec<String>>,
}

/// A supplier delivery into one warehouse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseReceipt {
    pub id: Uuid,
    pub supplier_id: Uuid,
    pub warehouse_id: Uuid,
    pub receipt_date: NaiveDate,
    pub currency: String,
    pub status: ReceiptStatus,
    /// Frozen once the receipt leaves DRAFT
    pub lines: Vec<ReceiptLine>,
    pub invoice_number: Option<String>,
    pub comment: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseReceipt {
    /// Build a DRAFT receipt from validated input
    pub fn draft(input: CreatePurchaseReceipt) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            supplier_id: input.supplier_id,
            warehouse_id: input.warehouse_id,
            receipt_date: input.receipt_date,
            currency: input.currency.trim().to_uppercase(),
            status: ReceiptStatus::Draft,
            lines: input.lines.into_iter().map(ReceiptLine::from).collect(),
            invoice_number: non_blank(input.invoice_number),
            comment: non_blank(input.comment),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sum of line quantities
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Sum of quantity * unit price over all lines
    pub fn total_amount(&self) -> Decimal {
        self.lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum()
    }
}

/// Input for a receipt line
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_line_input"))]
pub struct CreateReceiptLine {
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub lot_code: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub serial_numbers: Option<Vec<String>>,
}

impl From<CreateReceiptLine> for ReceiptLine {
    fn from(input: CreateReceiptLine) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: input.product_id,
            quantity: input.quantity,
            unit_price: input.unit_price,
            lot_code: non_blank(input.lot_code),
            expiration_date: input.expiration_date,
            serial_numbers: input
                .serial_numbers
                .map(|sns| sns.into_iter().map(|sn| sn.trim().to_string()).collect()),
        }
    }
}

/// Input for creating a draft receipt
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[validate(schema(function = "validate_receipt_input"))]
pub struct CreatePurchaseReceipt {
    pub supplier_id: Uuid,
    pub warehouse_id: Uuid,
    pub receipt_date: NaiveDate,
    #[validate(custom = "validate_currency")]
    pub currency: String,
    #[validate]
    pub lines: Vec<CreateReceiptLine>,
    pub invoice_number: Option<String>,
    pub comment: Option<String>,
}

/// Input for cancelling a confirmed receipt
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CancelReceiptInput {
    #[serde(default)]
    pub reason: String,
}

fn validate_receipt_input(input: &CreatePurchaseReceipt) -> Result<(), ValidationError> {
    if input.lines.is_empty() {
        let mut err = ValidationError::new("lines_required");
        err.message = Some("A receipt needs at least one line".into());
        return Err(err);
    }
    Ok(())
}

/// Three letters once surrounding whitespace is dropped, matching what
/// `PurchaseReceipt::draft` stores
fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    let code = currency.trim();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        let mut err = ValidationError::new("currency_format");
        err.message = Some("Currency must be a 3-letter code".into());
        return Err(err);
    }
    Ok(())
}

fn validate_line_input(line: &CreateReceiptLine) -> Result<(), ValidationError> {
    if line.quantity < 1 {
        let mut err = ValidationError::new("quantity_range");
        err.message = Some("Quantity must be at least 1".into());
        return Err(err);
    }
    if line.unit_price < Decimal::ZERO {
        let mut err = ValidationError::new("unit_price_range");
        err.message = Some("Unit price cannot be negative".into());
        return Err(err);
    }
    if let Some(serials) = &line.serial_numbers {
        if serials.iter().any(|sn| sn.trim().is_empty()) {
            let mut err = ValidationError::new("serial_number_blank");
            err.message = Some("Serial numbers cannot be blank".into());
            return Err(err);
        }
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
