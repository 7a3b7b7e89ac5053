//! Stockroom backend
//!
//! Purchase receipts that move stock into warehouses: the receipt engine,
//! its storage backends, and the HTTP API in front of them.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult};

use services::{ReceiptOperations, ReceiptService};
use store::InventoryStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub receipts: Arc<dyn ReceiptOperations>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire a receipt engine over `store`
    pub fn new<S: InventoryStore>(store: Arc<S>, config: Config) -> Self {
        Self {
            receipts: Arc::new(ReceiptService::new(store)),
            config: Arc::new(config),
        }
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .nest("/api/v1", routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Stockroom API v1.0"
}
