//! HTTP API tests
//!
//! Exercises the router end to end over the in-memory store: status codes,
//! JSON error bodies and the confirm/cancel endpoints.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use stockroom_backend::models::{Product, TrackingType};
use stockroom_backend::store::MemoryStore;
use stockroom_backend::{create_app, AppState, Config};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    warehouse_id: Uuid,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let state = AppState::new(Arc::clone(&store), Config::default());
        Self {
            router: create_app(state),
            store,
            warehouse_id: Uuid::new_v4(),
        }
    }

    async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn draft(&self, lines: Value) -> Value {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/v1/purchase-receipts",
                Some(json!({
                    "supplier_id": Uuid::new_v4(),
                    "warehouse_id": self.warehouse_id,
                    "receipt_date": "2024-06-01",
                    "currency": "thb",
                    "lines": lines,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

#[tokio::test]
async fn test_health_reports_storage() {
    let app = TestApp::new();
    let (status, body) = app.request(Method::GET, "/api/v1/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_receipt_lifecycle_over_http() {
    let app = TestApp::new();
    let product = app
        .store
        .insert_product(Product::new("Rice 5kg", "rice-5", TrackingType::Bulk))
        .await
        .unwrap();

    let receipt = app
        .draft(json!([{ "product_id": product.id, "quantity": 12, "unit_price": "3.25" }]))
        .await;
    assert_eq!(receipt["status"], "DRAFT");
    assert_eq!(receipt["currency"], "THB");
    let id = receipt["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(Method::PATCH, &format!("/api/v1/purchase-receipts/{}/confirm", id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONFIRMED");

    let (status, stock) = app
        .request(
            Method::GET,
            &format!("/api/v1/stock/{}?warehouse_id={}", product.id, app.warehouse_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["total_quantity"], 12);
    assert_eq!(stock["balances"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/api/v1/purchase-receipts/{}/cancel", id),
            Some(json!({ "reason": "short shipped" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(body["cancellation_reason"], "short shipped");

    let (_, stock) = app
        .request(Method::GET, &format!("/api/v1/stock/{}", product.id), None)
        .await;
    assert_eq!(stock["total_quantity"], 0);
}

#[tokio::test]
async fn test_confirm_twice_is_unprocessable() {
    let app = TestApp::new();
    let product = app
        .store
        .insert_product(Product::new("Rice 5kg", "rice-5", TrackingType::Bulk))
        .await
        .unwrap();
    let receipt = app
        .draft(json!([{ "product_id": product.id, "quantity": 1, "unit_price": "3.25" }]))
        .await;
    let uri = format!("/api/v1/purchase-receipts/{}/confirm", receipt["id"].as_str().unwrap());

    let (status, _) = app.request(Method::PATCH, &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.request(Method::PATCH, &uri, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_tracking_violation_names_the_line_field() {
    let app = TestApp::new();
    let product = app
        .store
        .insert_product(Product::new("Yogurt", "yog-1", TrackingType::Expirable))
        .await
        .unwrap();
    let receipt = app
        .draft(json!([{ "product_id": product.id, "quantity": 4, "unit_price": "0.80" }]))
        .await;

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/api/v1/purchase-receipts/{}/confirm", receipt["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "lines[0].expiration_date");
}

#[tokio::test]
async fn test_cancel_without_reason_is_bad_request() {
    let app = TestApp::new();
    let product = app
        .store
        .insert_product(Product::new("Rice 5kg", "rice-5", TrackingType::Bulk))
        .await
        .unwrap();
    let receipt = app
        .draft(json!([{ "product_id": product.id, "quantity": 1, "unit_price": "3.25" }]))
        .await;
    let id = receipt["id"].as_str().unwrap();
    app.request(Method::PATCH, &format!("/api/v1/purchase-receipts/{}/confirm", id), None)
        .await;

    let (status, body) = app
        .request(
            Method::PATCH,
            &format!("/api/v1/purchase-receipts/{}/cancel", id),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "reason");
}

#[tokio::test]
async fn test_unknown_receipt_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/purchase-receipts/{}", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_draft_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/purchase-receipts",
            Some(json!({
                "supplier_id": Uuid::new_v4(),
                "warehouse_id": app.warehouse_id,
                "receipt_date": "2024-06-01",
                "currency": "DOLLARS",
                "lines": [{ "product_id": Uuid::new_v4(), "quantity": 1, "unit_price": "1" }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
