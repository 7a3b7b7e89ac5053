//! WebAssembly module for Stockroom
//!
//! Lets the receipt entry screen run the same checks the server runs on
//! confirm, before anything is submitted:
//! - Tracking rules for a receipt line
//! - The `is_used` lock on product edits

use shared::{check_product_lock, validate_tracking, Product, ReceiptLine, TrackingType};
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::models::*;
pub use shared::validation::*;

/// Check a receipt line against the tracking rules of its product.
///
/// Both arguments are JSON. Fails with the violation message.
#[wasm_bindgen]
pub fn validate_receipt_line(product_json: &str, line_json: &str) -> Result<(), JsValue> {
    receipt_line_check(product_json, line_json).map_err(|e| JsValue::from_str(&e))
}

/// Check whether an edit to SKU or tracking type is still allowed.
///
/// Pass `undefined` for a field that is not being changed.
#[wasm_bindgen]
pub fn validate_product_edit(
    product_json: &str,
    new_sku: Option<String>,
    new_tracking_type: Option<String>,
) -> Result<(), JsValue> {
    product_edit_check(product_json, new_sku.as_deref(), new_tracking_type.as_deref())
        .map_err(|e| JsValue::from_str(&e))
}

/// Whether products of this tracking type are stocked in quantity buckets
#[wasm_bindgen]
pub fn is_bucketed_tracking(tracking_type: &str) -> bool {
    tracking_type
        .parse::<TrackingType>()
        .map(|t| t.is_bucketed())
        .unwrap_or(false)
}

fn receipt_line_check(product_json: &str, line_json: &str) -> Result<(), String> {
    let product: Product = serde_json::from_str(product_json)
        .map_err(|e| format!("Invalid product JSON: {}", e))?;
    let line: ReceiptLine =
        serde_json::from_str(line_json).map_err(|e| format!("Invalid line JSON: {}", e))?;

    validate_tracking(&product, &line).map_err(|v| v.to_string())
}

fn product_edit_check(
    product_json: &str,
    new_sku: Option<&str>,
    new_tracking_type: Option<&str>,
) -> Result<(), String> {
    let product: Product = serde_json::from_str(product_json)
        .map_err(|e| format!("Invalid product JSON: {}", e))?;
    let tracking_type = new_tracking_type
        .map(|t| t.parse::<TrackingType>())
        .transpose()?;

    check_product_lock(&product, new_sku, tracking_type).map_err(|v| v.to_string())
}
