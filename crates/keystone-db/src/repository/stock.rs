//! # Stock Repository
//!
//! Quantity-on-hand per (location, product), its movement history and
//! manual adjustment documents.
//!
//! ## Upsert
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INSERT INTO stock (location_id, product_id, quantity_milli, ...)      │
//! │  VALUES (?, ?, delta, ...)                                             │
//! │  ON CONFLICT (location_id, product_id)                                 │
//! │  DO UPDATE SET quantity_milli = quantity_milli + excluded.quantity     │
//! │                                                                         │
//! │  + INSERT INTO stock_movements (..., delta, cause, reference)          │
//! │                                                                         │
//! │  No floor is enforced here. Callers that must not go negative read    │
//! │  the quantity first, in the same transaction.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use keystone_core::{MovementCause, Quantity, StockAdjustment, StockLevel, StockMovement, StockRecord};

/// Who and what caused a stock change.
#[derive(Debug, Clone, Copy)]
pub struct MovementContext<'a> {
    pub cause: MovementCause,
    pub reference: Option<&'a str>,
    pub user_id: Option<i64>,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Adds `delta` to the stock record (creating it if absent) and appends a
/// movement row. Returns the updated record.
pub async fn adjust(
    conn: &mut SqliteConnection,
    location_id: i64,
    product_id: i64,
    delta: Quantity,
    ctx: MovementContext<'_>,
) -> DbResult<StockRecord> {
    let record = sqlx::query_as::<_, StockRecord>(
        r#"
        INSERT INTO stock (location_id, product_id, quantity_milli, reserved_quantity_milli, last_updated)
        VALUES (?1, ?2, ?3, 0, ?4)
        ON CONFLICT (location_id, product_id) DO UPDATE SET
            quantity_milli = quantity_milli + excluded.quantity_milli,
            last_updated = excluded.last_updated
        RETURNING location_id, product_id, quantity_milli, reserved_quantity_milli, last_updated
        "#,
    )
    .bind(location_id)
    .bind(product_id)
    .bind(delta.milli())
    .bind(ctx.at)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO stock_movements (location_id, product_id, delta_milli, cause, reference, created_by, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(location_id)
    .bind(product_id)
    .bind(delta.milli())
    .bind(ctx.cause)
    .bind(ctx.reference)
    .bind(ctx.user_id)
    .bind(ctx.at)
    .execute(&mut *conn)
    .await?;

    debug!(
        location_id,
        product_id,
        delta = %delta,
        quantity = %record.quantity(),
        cause = %ctx.cause,
        "Stock adjusted"
    );
    Ok(record)
}

/// Quantity on hand; zero when no record exists.
pub async fn quantity_on(conn: &mut SqliteConnection, location_id: i64, product_id: i64) -> DbResult<Quantity> {
    let milli: Option<i64> = sqlx::query_scalar(
        "SELECT quantity_milli FROM stock WHERE location_id = ?1 AND product_id = ?2",
    )
    .bind(location_id)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(Quantity::from_milli(milli.unwrap_or(0)))
}

/// Input for [`insert_adjustment`].
#[derive(Debug, Clone)]
pub struct NewStockAdjustment<'a> {
    pub company_id: i64,
    pub location_id: i64,
    pub product_id: i64,
    pub adjustment_number: &'a str,
    pub delta: Quantity,
    pub reason: &'a str,
    pub created_by: i64,
    pub at: DateTime<Utc>,
}

pub async fn insert_adjustment(
    conn: &mut SqliteConnection,
    adj: &NewStockAdjustment<'_>,
) -> DbResult<StockAdjustment> {
    let row = sqlx::query_as::<_, StockAdjustment>(
        r#"
        INSERT INTO stock_adjustments (
            company_id, location_id, product_id, adjustment_number,
            delta_milli, reason, created_by, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        RETURNING id, company_id, location_id, product_id, adjustment_number,
                  delta_milli, reason, created_by, created_at
        "#,
    )
    .bind(adj.company_id)
    .bind(adj.location_id)
    .bind(adj.product_id)
    .bind(adj.adjustment_number)
    .bind(adj.delta.milli())
    .bind(adj.reason)
    .bind(adj.created_by)
    .bind(adj.at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

// =============================================================================
// Pool-Level Reads
// =============================================================================

/// Repository for stock reads.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    pub async fn get(&self, location_id: i64, product_id: i64) -> DbResult<Option<StockRecord>> {
        let record = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT location_id, product_id, quantity_milli, reserved_quantity_milli, last_updated
            FROM stock
            WHERE location_id = ?1 AND product_id = ?2
            "#,
        )
        .bind(location_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Quantity on hand; zero when no record exists.
    pub async fn quantity(&self, location_id: i64, product_id: i64) -> DbResult<Quantity> {
        let mut conn = self.pool.acquire().await?;
        quantity_on(&mut conn, location_id, product_id).await
    }

    /// Most recent movements first.
    pub async fn movements(&self, location_id: i64, product_id: i64, limit: u32) -> DbResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, StockMovement>(
            r#"
            SELECT id, location_id, product_id, delta_milli, cause, reference, created_by, created_at
            FROM stock_movements
            WHERE location_id = ?1 AND product_id = ?2
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )
        .bind(location_id)
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stock records of a location with product name and SKU, by product
    /// name. `product_id` narrows the listing to one product.
    pub async fn list_for_location(
        &self,
        company_id: i64,
        location_id: i64,
        product_id: Option<i64>,
    ) -> DbResult<Vec<StockLevel>> {
        let rows = sqlx::query_as::<_, StockLevel>(
            r#"
            SELECT s.location_id, s.product_id, p.name AS product_name, p.sku,
                   s.quantity_milli, s.reserved_quantity_milli, s.last_updated
            FROM stock s
            JOIN products p ON p.id = s.product_id
            WHERE p.company_id = ?1 AND s.location_id = ?2 AND (?3 IS NULL OR s.product_id = ?3)
            ORDER BY p.name, p.id
            "#,
        )
        .bind(company_id)
        .bind(location_id)
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        debug!(company_id, location_id, rows = rows.len(), "Listed stock");
        Ok(rows)
    }

    /// Adjustment documents of a location, newest first.
    pub async fn adjustments(&self, company_id: i64, location_id: i64) -> DbResult<Vec<StockAdjustment>> {
        let rows = sqlx::query_as::<_, StockAdjustment>(
            r#"
            SELECT id, company_id, location_id, product_id, adjustment_number,
                   delta_milli, reason, created_by, created_at
            FROM stock_adjustments
            WHERE company_id = ?1 AND location_id = ?2
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(company_id)
        .bind(location_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Σ quantity of a product across all locations of a company.
    pub async fn company_total(&self, company_id: i64, product_id: i64) -> DbResult<Quantity> {
        let milli: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(s.quantity_milli)
            FROM stock s
            JOIN locations l ON l.id = s.location_id
            WHERE l.company_id = ?1 AND s.product_id = ?2
            "#,
        )
        .bind(company_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Quantity::from_milli(milli.unwrap_or(0)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::catalog::NewProduct;
    use crate::{Database, DbConfig};

    async fn setup() -> (Database, i64, i64) {
        let (db, _, location, product) = setup_company().await;
        (db, location, product)
    }

    /// Returns (db, company, location, product).
    async fn setup_company() -> (Database, i64, i64, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let company = db.catalog().insert_company("Acme").await.unwrap();
        let location = db.catalog().insert_location(company.id, "Main").await.unwrap();
        let product = insert_product(&db, company.id, "W-1", "Widget").await;
        (db, company.id, location.id, product)
    }

    async fn insert_product(db: &Database, company_id: i64, sku: &str, name: &str) -> i64 {
        db.catalog()
            .insert_product(&NewProduct {
                company_id,
                category_id: None,
                sku: sku.to_string(),
                name: name.to_string(),
                price_cents: 100,
                tax_id: None,
            })
            .await
            .unwrap()
            .id
    }

    fn ctx(cause: MovementCause) -> MovementContext<'static> {
        MovementContext {
            cause,
            reference: Some("TEST-1"),
            user_id: Some(1),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_accumulates() {
        let (db, location, product) = setup().await;

        let mut tx = db.begin().await.unwrap();
        let first = adjust(&mut tx, location, product, Quantity::from_units(5), ctx(MovementCause::Adjustment))
            .await
            .unwrap();
        let second = adjust(&mut tx, location, product, Quantity::from_units(-2), ctx(MovementCause::Sale))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.quantity(), Quantity::from_units(5));
        assert_eq!(second.quantity(), Quantity::from_units(3));

        let movements = db.stock().movements(location, product, 10).await.unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].cause, MovementCause::Sale);
        assert_eq!(movements[0].delta_milli, -2000);
    }

    #[tokio::test]
    async fn test_adjust_does_not_floor_at_zero() {
        let (db, location, product) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let record = adjust(&mut tx, location, product, Quantity::from_units(-1), ctx(MovementCause::Adjustment))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        assert!(record.quantity().is_negative());
    }

    #[tokio::test]
    async fn test_rollback_discards_adjustment() {
        let (db, location, product) = setup().await;
        {
            let mut tx = db.begin().await.unwrap();
            adjust(&mut tx, location, product, Quantity::from_units(7), ctx(MovementCause::Adjustment))
                .await
                .unwrap();
            tx.rollback().await.unwrap();
        }
        assert_eq!(db.stock().quantity(location, product).await.unwrap(), Quantity::zero());
        assert!(db.stock().get(location, product).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_location_listing_is_sorted_by_product_name() {
        let (db, company, location, widget) = setup_company().await;
        let anvil = insert_product(&db, company, "A-1", "Anvil").await;

        let mut tx = db.begin().await.unwrap();
        adjust(&mut tx, location, widget, Quantity::from_units(3), ctx(MovementCause::Adjustment))
            .await
            .unwrap();
        adjust(&mut tx, location, anvil, Quantity::from_units(1), ctx(MovementCause::Adjustment))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stock = db.stock();
        let all = stock.list_for_location(company, location, None).await.unwrap();
        let names: Vec<_> = all.iter().map(|l| l.product_name.as_str()).collect();
        assert_eq!(names, vec!["Anvil", "Widget"]);
        assert_eq!(all[1].sku, "W-1");
        assert_eq!(all[1].quantity(), Quantity::from_units(3));

        let one = stock.list_for_location(company, location, Some(widget)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].product_id, widget);

        assert!(stock.list_for_location(company + 1, location, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjustments_newest_first() {
        let (db, company, location, product) = setup_company().await;
        let earlier = Utc::now() - chrono::Duration::minutes(5);

        let mut tx = db.begin().await.unwrap();
        for (number, at) in [("ADJ-1", earlier), ("ADJ-2", Utc::now())] {
            insert_adjustment(
                &mut tx,
                &NewStockAdjustment {
                    company_id: company,
                    location_id: location,
                    product_id: product,
                    adjustment_number: number,
                    delta: Quantity::from_units(1),
                    reason: "count",
                    created_by: 1,
                    at,
                },
            )
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();

        let rows = db.stock().adjustments(company, location).await.unwrap();
        let numbers: Vec<_> = rows.iter().map(|a| a.adjustment_number.as_str()).collect();
        assert_eq!(numbers, vec!["ADJ-2", "ADJ-1"]);
        assert!(db.stock().adjustments(company + 1, location).await.unwrap().is_empty());
    }
}
