//! HTTP handlers for stock ledger queries

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::StockBalance;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub warehouse_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProductStockResponse {
    pub product_id: Uuid,
    pub warehouse_id: Option<Uuid>,
    pub total_quantity: i64,
    pub balances: Vec<StockBalance>,
}

/// Get the ledger rows of a product
pub async fn get_product_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<StockQuery>,
) -> AppResult<Json<ProductStockResponse>> {
    let balances = state
        .receipts
        .stock_for_product(product_id, query.warehouse_id)
        .await?;

    Ok(Json(ProductStockResponse {
        product_id,
        warehouse_id: query.warehouse_id,
        total_quantity: balances.iter().map(|b| b.quantity).sum(),
        balances,
    }))
}
