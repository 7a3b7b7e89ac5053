//! Property-based tests for the stock ledger
//!
//! - Confirmed deltas equal the receipt's line quantities
//! - Cancel restores every touched bucket to its pre-confirm value
//! - Separate receipts into the same bucket add up

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;
use tokio_test::block_on;
use rust_decimal::Decimal;
use stockroom_backend::models::{
    BucketKey, CreatePurchaseReceipt, CreateReceiptLine, Product, StockBalance, TrackingType,
};
use stockroom_backend::services::ReceiptService;
use stockroom_backend::store::{MemoryStore, StockLedgerStore, Transactional};
use uuid::Uuid;

// ============================================================================
// Property Test Strategies
// ============================================================================

/// One receipt line: which product, how many, which lot
#[derive(Debug, Clone)]
struct PlannedLine {
    product: usize,
    quantity: i64,
    lot: Option<u8>,
}

fn planned_line_strategy() -> impl Strategy<Value = PlannedLine> {
    (0usize..3, 1i64..50, prop::option::of(0u8..3)).prop_map(|(product, quantity, lot)| PlannedLine {
        product,
        quantity,
        lot,
    })
}

fn receipt_strategy() -> impl Strategy<Value = Vec<PlannedLine>> {
    prop::collection::vec(planned_line_strategy(), 1..8)
}

/// Stock already on hand before the receipt under test
fn opening_stock_strategy() -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(0i64..20, 3)
}

// ============================================================================
// Harness
// ============================================================================

struct Ledger {
    service: ReceiptService<MemoryStore>,
    store: Arc<MemoryStore>,
    warehouse_id: Uuid,
    products: Vec<Product>,
}

impl Ledger {
    async fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let mut products = Vec::new();
        for (i, sku) in ["AA", "BB", "CC"].iter().enumerate() {
            let product = Product::new(format!("Product {}", i), *sku, TrackingType::Bulk);
            products.push(store.insert_product(product).await.unwrap());
        }
        Self {
            service: ReceiptService::new(Arc::clone(&store)),
            store,
            warehouse_id: Uuid::new_v4(),
            products,
        }
    }

    fn key(&self, planned: &PlannedLine) -> BucketKey {
        let key = BucketKey::new(self.products[planned.product].id, self.warehouse_id);
        match planned.lot {
            Some(lot) => key.with_lot(format!("LOT-{}", lot)),
            None => key,
        }
    }

    async fn receive(&self, lines: &[PlannedLine]) -> Uuid {
        let lines = lines
            .iter()
            .map(|planned| CreateReceiptLine {
                product_id: self.products[planned.product].id,
                quantity: planned.quantity,
                unit_price: Decimal::ONE,
                lot_code: planned.lot.map(|lot| format!("LOT-{}", lot)),
                expiration_date: None,
                serial_numbers: None,
            })
            .collect();
        let receipt = self
            .service
            .create(CreatePurchaseReceipt {
                supplier_id: Uuid::new_v4(),
                warehouse_id: self.warehouse_id,
                receipt_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                currency: "EUR".to_string(),
                lines,
                invoice_number: None,
                comment: None,
            })
            .await
            .unwrap();
        receipt.id
    }

    async fn snapshot(&self) -> Vec<StockBalance> {
        let mut rows = Vec::new();
        for product in &self.products {
            rows.extend(
                self.service
                    .stock_for_product(product.id, None)
                    .await
                    .unwrap(),
            );
        }
        rows.sort_by_key(|row| (row.product_id, row.lot_code.clone()));
        rows
    }

    async fn quantity(&self, key: &BucketKey) -> i64 {
        let mut tx = self.store.begin().await.unwrap();
        self.store
            .get_bucket(&mut tx, key)
            .await
            .unwrap()
            .map_or(0, |row| row.quantity)
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_confirm_deltas_match_line_quantities(lines in receipt_strategy()) {
        block_on(async {
            let ledger = Ledger::new().await;
            let id = ledger.receive(&lines).await;
            ledger.service.confirm(id).await.unwrap();

            let mut expected: HashMap<BucketKey, i64> = HashMap::new();
            for planned in &lines {
                *expected.entry(ledger.key(planned)).or_default() += planned.quantity;
            }
            for (key, quantity) in &expected {
                assert_eq!(ledger.quantity(key).await, *quantity);
            }

            let total: i64 = ledger.snapshot().await.iter().map(|row| row.quantity).sum();
            assert_eq!(total, lines.iter().map(|s| s.quantity).sum::<i64>());
        });
    }

    #[test]
    fn prop_cancel_restores_pre_confirm_ledger(
        opening in opening_stock_strategy(),
        lines in receipt_strategy(),
    ) {
        block_on(async {
            let ledger = Ledger::new().await;

            let opening_lines: Vec<PlannedLine> = opening
                .iter()
                .enumerate()
                .filter(|(_, quantity)| **quantity > 0)
                .map(|(product, quantity)| PlannedLine { product, quantity: *quantity, lot: None })
                .collect();
            if !opening_lines.is_empty() {
                let id = ledger.receive(&opening_lines).await;
                ledger.service.confirm(id).await.unwrap();
            }
            let before = ledger.snapshot().await;

            let id = ledger.receive(&lines).await;
            ledger.service.confirm(id).await.unwrap();
            ledger.service.cancel(id, "round trip").await.unwrap();

            let after = ledger.snapshot().await;
            let strip = |rows: &[StockBalance]| -> Vec<(Uuid, Option<String>, i64)> {
                rows.iter()
                    .map(|r| (r.product_id, r.lot_code.clone(), r.quantity))
                    .collect()
            };
            assert_eq!(strip(&before), strip(&after));
        });
    }

    #[test]
    fn prop_bulk_receipts_are_additive(quantities in prop::collection::vec(1i64..100, 1..6)) {
        block_on(async {
            let ledger = Ledger::new().await;
            for quantity in &quantities {
                let planned = PlannedLine { product: 0, quantity: *quantity, lot: None };
                let id = ledger.receive(&[planned]).await;
                ledger.service.confirm(id).await.unwrap();
            }

            let key = BucketKey::new(ledger.products[0].id, ledger.warehouse_id);
            assert_eq!(ledger.quantity(&key).await, quantities.iter().sum::<i64>());
        });
    }
}
