//! PostgreSQL storage backend

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::{BucketKey, Product, PurchaseReceipt, ReceiptLine, SerialUnit, StockBalance};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{ProductRegistry, ReceiptRepository, StockLedgerStore, Transactional};
use crate::config::{DatabaseConfig, IsolationLevel};
use crate::error::{AppError, AppResult};

const SERIAL_NUMBER_INDEX: &str = "stock_balances_serial_number_key";
const QUANTITY_CHECK: &str = "stock_balances_quantity_non_negative";

const RECEIPT_COLUMNS: &str = "id, supplier_id, warehouse_id, receipt_date, currency, status, \
     lines, invoice_number, comment, cancellation_reason, created_at, updated_at";

const STOCK_COLUMNS: &str =
    "id, product_id, warehouse_id, quantity, lot_code, expiration_date, serial_number";

/// PostgreSQL-backed products, receipts and stock ledger
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    isolation_level: IsolationLevel,
    lock_timeout: Duration,
}

/// Database row for a product
#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    sku: String,
    unit_of_measure: String,
    category_id: Option<Uuid>,
    tracking_type: String,
    is_variant_parent: bool,
    parent_id: Option<Uuid>,
    variant_attributes: Json<HashMap<String, String>>,
    is_used: bool,
    is_active: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = AppError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id,
            name: row.name,
            sku: row.sku,
            unit_of_measure: row.unit_of_measure,
            category_id: row.category_id,
            tracking_type: row.tracking_type.parse().map_err(AppError::Internal)?,
            is_variant_parent: row.is_variant_parent,
            parent_id: row.parent_id,
            variant_attributes: row.variant_attributes.0,
            is_used: row.is_used,
            is_active: row.is_active,
            deleted_at: row.deleted_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for a purchase receipt
#[derive(Debug, FromRow)]
struct ReceiptRow {
    id: Uuid,
    supplier_id: Uuid,
    warehouse_id: Uuid,
    receipt_date: NaiveDate,
    currency: String,
    status: String,
    lines: Json<Vec<ReceiptLine>>,
    invoice_number: Option<String>,
    comment: Option<String>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReceiptRow> for PurchaseReceipt {
    type Error = AppError;

    fn try_from(row: ReceiptRow) -> Result<Self, Self::Error> {
        Ok(PurchaseReceipt {
            id: row.id,
            supplier_id: row.supplier_id,
            warehouse_id: row.warehouse_id,
            receipt_date: row.receipt_date,
            currency: row.currency,
            status: row.status.parse().map_err(AppError::Internal)?,
            lines: row.lines.0,
            invoice_number: row.invoice_number,
            comment: row.comment,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for a stock ledger entry
#[derive(Debug, FromRow)]
struct StockRow {
    id: Uuid,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
    lot_code: Option<String>,
    expiration_date: Option<NaiveDate>,
    serial_number: Option<String>,
}

impl From<StockRow> for StockBalance {
    fn from(row: StockRow) -> Self {
        StockBalance {
            id: row.id,
            product_id: row.product_id,
            warehouse_id: row.warehouse_id,
            quantity: row.quantity,
            lot_code: row.lot_code,
            expiration_date: row.expiration_date,
            serial_number: row.serial_number,
        }
    }
}

impl PostgresStore {
    /// Connect a pool using the database settings. Row locks taken inside a
    /// unit of work wait at most `lock_timeout`.
    pub async fn connect(config: &DatabaseConfig, lock_timeout: Duration) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self::from_pool(pool, config.isolation_level, lock_timeout))
    }

    pub fn from_pool(pool: PgPool, isolation_level: IsolationLevel, lock_timeout: Duration) -> Self {
        Self {
            pool,
            isolation_level,
            lock_timeout,
        }
    }

    /// Register a product, as the product service would
    pub async fn insert_product(&self, product: Product) -> AppResult<Product> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, sku, unit_of_measure, category_id, tracking_type,
                                  is_variant_parent, parent_id, variant_attributes, is_used,
                                  is_active, deleted_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, sku = EXCLUDED.sku,
                unit_of_measure = EXCLUDED.unit_of_measure,
                category_id = EXCLUDED.category_id, tracking_type = EXCLUDED.tracking_type,
                is_variant_parent = EXCLUDED.is_variant_parent, parent_id = EXCLUDED.parent_id,
                variant_attributes = EXCLUDED.variant_attributes, is_used = EXCLUDED.is_used,
                is_active = EXCLUDED.is_active, deleted_at = EXCLUDED.deleted_at,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.unit_of_measure)
        .bind(product.category_id)
        .bind(product.tracking_type.as_str())
        .bind(product.is_variant_parent)
        .bind(product.parent_id)
        .bind(Json(&product.variant_attributes))
        .bind(product.is_used)
        .bind(product.is_active)
        .bind(product.deleted_at)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(product)
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("migration failed: {}", e)))
    }
}

/// Translate the database errors the ledger cares about into domain errors
fn map_db_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") if db_err.constraint() == Some(SERIAL_NUMBER_INDEX) => {
                return AppError::duplicate_serial(None);
            }
            Some("23514") if db_err.constraint() == Some(QUANTITY_CHECK) => {
                return AppError::insufficient_stock("bucket quantity cannot go below zero");
            }
            // serialization_failure, deadlock_detected, lock_not_available
            Some("40001") | Some("40P01") | Some("55P03") => {
                return AppError::Conflict(db_err.message().to_string());
            }
            _ => {}
        }
    }
    AppError::DatabaseError(err)
}

#[async_trait]
impl Transactional for PostgresStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> AppResult<Self::Tx> {
        let mut tx = self.pool.begin().await.map_err(map_db_error)?;

        if self.isolation_level != IsolationLevel::ReadCommitted {
            let statement = format!(
                "SET TRANSACTION ISOLATION LEVEL {}",
                self.isolation_level.to_sql()
            );
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(map_db_error)?;
        }

        // SET does not take bind parameters
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(map_db_error)?;

        Ok(tx)
    }

    async fn commit(&self, tx: Self::Tx) -> AppResult<()> {
        tx.commit().await.map_err(map_db_error)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ProductRegistry for PostgresStore {
    async fn get_product(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<Product> {
        let row = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT id, name, sku, unit_of_measure, category_id, tracking_type, is_variant_parent,
                   parent_id, variant_attributes, is_used, is_active, deleted_at,
                   created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| AppError::NotFound(format!("Product \"{}\"", id)))?;

        row.try_into()
    }

    async fn mark_used(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET is_used = TRUE,
                updated_at = CASE WHEN is_used THEN updated_at ELSE NOW() END
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Product \"{}\"", id)));
        }

        Ok(())
    }
}

#[async_trait]
impl StockLedgerStore for PostgresStore {
    async fn upsert_bucket(&self, tx: &mut Self::Tx, key: &BucketKey, quantity: i64) -> AppResult<i64> {
        let balance = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO stock_balances (id, product_id, warehouse_id, quantity, lot_code, expiration_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (product_id, warehouse_id, lot_code, expiration_date)
                WHERE serial_number IS NULL
            DO UPDATE SET quantity = stock_balances.quantity + EXCLUDED.quantity,
                          updated_at = NOW()
            RETURNING quantity
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key.product_id)
        .bind(key.warehouse_id)
        .bind(quantity)
        .bind(&key.lot_code)
        .bind(key.expiration_date)
        .fetch_one(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(balance)
    }

    async fn decrement_bucket(&self, tx: &mut Self::Tx, key: &BucketKey, quantity: i64) -> AppResult<i64> {
        let remaining = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE stock_balances
            SET quantity = quantity - $5,
                updated_at = NOW()
            WHERE product_id = $1 AND warehouse_id = $2
              AND lot_code IS NOT DISTINCT FROM $3
              AND expiration_date IS NOT DISTINCT FROM $4
              AND serial_number IS NULL
            RETURNING quantity
            "#,
        )
        .bind(key.product_id)
        .bind(key.warehouse_id)
        .bind(&key.lot_code)
        .bind(key.expiration_date)
        .bind(quantity)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_db_error)?;

        remaining.ok_or_else(|| {
            AppError::insufficient_stock(format!("no bucket for product \"{}\"", key.product_id))
        })
    }

    async fn insert_serial_units(&self, tx: &mut Self::Tx, units: &[SerialUnit]) -> AppResult<()> {
        if units.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO stock_balances (id, product_id, warehouse_id, quantity, serial_number) ",
        );
        builder.push_values(units, |mut row, unit| {
            row.push_bind(Uuid::new_v4())
                .push_bind(unit.product_id)
                .push_bind(unit.warehouse_id)
                .push_bind(1_i64)
                .push_bind(unit.serial_number.clone());
        });

        builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(map_db_error)?;

        Ok(())
    }

    async fn delete_by_key(&self, tx: &mut Self::Tx, key: &BucketKey) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM stock_balances
            WHERE product_id = $1 AND warehouse_id = $2
              AND lot_code IS NOT DISTINCT FROM $3
              AND expiration_date IS NOT DISTINCT FROM $4
              AND serial_number IS NULL
            "#,
        )
        .bind(key.product_id)
        .bind(key.warehouse_id)
        .bind(&key.lot_code)
        .bind(key.expiration_date)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn delete_by_serials(
        &self,
        tx: &mut Self::Tx,
        warehouse_id: Uuid,
        serials: &[String],
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM stock_balances WHERE warehouse_id = $1 AND serial_number = ANY($2)",
        )
        .bind(warehouse_id)
        .bind(serials)
        .execute(&mut **tx)
        .await
        .map_err(map_db_error)?;

        Ok(result.rows_affected())
    }

    async fn get_bucket(&self, tx: &mut Self::Tx, key: &BucketKey) -> AppResult<Option<StockBalance>> {
        let query = format!(
            r#"
            SELECT {}
            FROM stock_balances
            WHERE product_id = $1 AND warehouse_id = $2
              AND lot_code IS NOT DISTINCT FROM $3
              AND expiration_date IS NOT DISTINCT FROM $4
              AND serial_number IS NULL
            FOR UPDATE
            "#,
            STOCK_COLUMNS
        );

        let row = sqlx::query_as::<_, StockRow>(&query)
            .bind(key.product_id)
            .bind(key.warehouse_id)
            .bind(&key.lot_code)
            .bind(key.expiration_date)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_error)?;

        Ok(row.map(Into::into))
    }

    async fn list_balances(
        &self,
        tx: &mut Self::Tx,
        product_id: Uuid,
        warehouse_id: Option<Uuid>,
    ) -> AppResult<Vec<StockBalance>> {
        let query = format!(
            r#"
            SELECT {}
            FROM stock_balances
            WHERE product_id = $1 AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY warehouse_id, lot_code NULLS FIRST, expiration_date NULLS FIRST,
                     serial_number NULLS FIRST
            "#,
            STOCK_COLUMNS
        );

        let rows = sqlx::query_as::<_, StockRow>(&query)
            .bind(product_id)
            .bind(warehouse_id)
            .fetch_all(&mut **tx)
            .await
            .map_err(map_db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ReceiptRepository for PostgresStore {
    async fn insert_receipt(
        &self,
        tx: &mut Self::Tx,
        receipt: &PurchaseReceipt,
    ) -> AppResult<PurchaseReceipt> {
        let query = format!(
            r#"
            INSERT INTO purchase_receipts ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {cols}
            "#,
            cols = RECEIPT_COLUMNS
        );

        let row = sqlx::query_as::<_, ReceiptRow>(&query)
            .bind(receipt.id)
            .bind(receipt.supplier_id)
            .bind(receipt.warehouse_id)
            .bind(receipt.receipt_date)
            .bind(&receipt.currency)
            .bind(receipt.status.as_str())
            .bind(Json(&receipt.lines))
            .bind(&receipt.invoice_number)
            .bind(&receipt.comment)
            .bind(&receipt.cancellation_reason)
            .bind(receipt.created_at)
            .bind(receipt.updated_at)
            .fetch_one(&mut **tx)
            .await
            .map_err(map_db_error)?;

        row.try_into()
    }

    async fn load_receipt(&self, tx: &mut Self::Tx, id: Uuid) -> AppResult<PurchaseReceipt> {
        let query = format!(
            "SELECT {} FROM purchase_receipts WHERE id = $1 FOR UPDATE",
            RECEIPT_COLUMNS
        );

        let row = sqlx::query_as::<_, ReceiptRow>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| AppError::NotFound(format!("Purchase Receipt \"{}\"", id)))?;

        row.try_into()
    }

    async fn save_receipt_status(
        &self,
        tx: &mut Self::Tx,
        receipt: &PurchaseReceipt,
    ) -> AppResult<PurchaseReceipt> {
        let query = format!(
            r#"
            UPDATE purchase_receipts
            SET status = $1, cancellation_reason = $2, updated_at = $3
            WHERE id = $4
            RETURNING {}
            "#,
            RECEIPT_COLUMNS
        );

        let row = sqlx::query_as::<_, ReceiptRow>(&query)
            .bind(receipt.status.as_str())
            .bind(&receipt.cancellation_reason)
            .bind(receipt.updated_at)
            .bind(receipt.id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| AppError::NotFound(format!("Purchase Receipt \"{}\"", receipt.id)))?;

        row.try_into()
    }
}
