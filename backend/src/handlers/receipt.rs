//! HTTP handlers for purchase receipt endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{CancelReceiptInput, CreatePurchaseReceipt, PurchaseReceipt};
use crate::services::retry_on_conflict;
use crate::AppState;

/// Create a draft purchase receipt
pub async fn create_receipt(
    State(state): State<AppState>,
    Json(input): Json<CreatePurchaseReceipt>,
) -> AppResult<(StatusCode, Json<PurchaseReceipt>)> {
    let receipt = state.receipts.create(input).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Get a purchase receipt by ID
pub async fn get_receipt(
    State(state): State<AppState>,
    Path(receipt_id): Path<Uuid>,
) -> AppResult<Json<PurchaseReceipt>> {
    let receipt = state.receipts.find(receipt_id).await?;
    Ok(Json(receipt))
}

/// Confirm a draft receipt and add its lines to stock
pub async fn confirm_receipt(
    State(state): State<AppState>,
    Path(receipt_id): Path<Uuid>,
) -> AppResult<Json<PurchaseReceipt>> {
    let settings = &state.config.receipts;
    let receipt = retry_on_conflict(
        settings.max_conflict_retries,
        settings.retry_backoff(),
        || state.receipts.confirm(receipt_id),
    )
    .await?;
    Ok(Json(receipt))
}

/// Cancel a confirmed receipt and take its stock back out
pub async fn cancel_receipt(
    State(state): State<AppState>,
    Path(receipt_id): Path<Uuid>,
    Json(input): Json<CancelReceiptInput>,
) -> AppResult<Json<PurchaseReceipt>> {
    let settings = &state.config.receipts;
    let receipt = retry_on_conflict(
        settings.max_conflict_retries,
        settings.retry_backoff(),
        || state.receipts.cancel(receipt_id, &input.reason),
    )
    .await?;
    Ok(Json(receipt))
}
