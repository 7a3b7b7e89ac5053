//! Route definitions for Stockroom

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/purchase-receipts", receipt_routes())
        .route("/stock/:product_id", get(handlers::get_product_stock))
}

/// Purchase receipt routes
fn receipt_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_receipt))
        .route("/:receipt_id", get(handlers::get_receipt))
        .route("/:receipt_id/confirm", patch(handlers::confirm_receipt))
        .route("/:receipt_id/cancel", patch(handlers::cancel_receipt))
}
