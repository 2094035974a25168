//! # Sale Repository
//!
//! Sale headers, lines and applied promotions.
//!
//! ## Status Changes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every status change is a guarded UPDATE:                              │
//! │                                                                         │
//! │  complete_draft   DRAFT(any pos)      → COMPLETED / COMPLETED          │
//! │  set_pos_status   DRAFT + from        → DRAFT + to                     │
//! │  mark_void        expected status     → VOID                           │
//! │  soft_delete      DRAFT               → is_deleted = 1                 │
//! │  update_details   any (not deleted)   → notes / payment method only    │
//! │                                                                         │
//! │  Zero rows affected means the sale is missing or in another state;    │
//! │  the caller looks the row up again to tell which.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use keystone_core::sale::AppliedPromotion;
use keystone_core::{PosStatus, Sale, SaleDocument, SaleLine, SaleStatus};

const SALE_COLUMNS: &str = "id, company_id, location_id, sale_number, customer_id, created_by, \
     subtotal_cents, tax_cents, discount_cents, total_cents, paid_cents, status, pos_status, \
     is_quick_sale, voids_sale_id, idempotency_key, notes, payment_method_id, is_deleted, created_at, updated_at";

const LINE_COLUMNS: &str = "id, sale_id, product_id, description, quantity_milli, unit_price_cents, \
     discount_bps, discount_cents, tax_id, tax_cents, line_total_cents, serial_numbers";

/// Header values for [`insert_sale`].
#[derive(Debug, Clone)]
pub struct NewSale {
    pub company_id: i64,
    pub location_id: i64,
    pub sale_number: String,
    pub customer_id: Option<i64>,
    pub created_by: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub status: SaleStatus,
    pub pos_status: PosStatus,
    pub is_quick_sale: bool,
    pub voids_sale_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub payment_method_id: Option<i64>,
    pub at: DateTime<Utc>,
}

/// Line values for [`insert_line`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewSaleLine {
    pub product_id: Option<i64>,
    pub description: Option<String>,
    pub quantity_milli: i64,
    pub unit_price_cents: i64,
    pub discount_bps: i64,
    pub discount_cents: i64,
    pub tax_id: Option<i64>,
    pub tax_cents: i64,
    pub line_total_cents: i64,
    pub serial_numbers: Option<String>,
}

impl NewSaleLine {
    /// The reversing line for a void document.
    pub fn mirror_of(line: &SaleLine) -> Self {
        NewSaleLine {
            product_id: line.product_id,
            description: line.description.clone(),
            quantity_milli: -line.quantity_milli,
            unit_price_cents: line.unit_price_cents,
            discount_bps: line.discount_bps,
            discount_cents: -line.discount_cents,
            tax_id: line.tax_id,
            tax_cents: -line.tax_cents,
            line_total_cents: -line.line_total_cents,
            serial_numbers: line.serial_numbers.clone(),
        }
    }
}

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

pub async fn insert_sale(conn: &mut SqliteConnection, sale: &NewSale) -> DbResult<Sale> {
    let sql = format!(
        r#"
        INSERT INTO sales (
            company_id, location_id, sale_number, customer_id, created_by,
            subtotal_cents, tax_cents, discount_cents, total_cents, paid_cents,
            status, pos_status, is_quick_sale, voids_sale_id, idempotency_key,
            notes, payment_method_id, is_deleted, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14, ?15,
            ?16, ?17, 0, ?18, ?18
        )
        RETURNING {SALE_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, Sale>(&sql)
        .bind(sale.company_id)
        .bind(sale.location_id)
        .bind(&sale.sale_number)
        .bind(sale.customer_id)
        .bind(sale.created_by)
        .bind(sale.subtotal_cents)
        .bind(sale.tax_cents)
        .bind(sale.discount_cents)
        .bind(sale.total_cents)
        .bind(sale.paid_cents)
        .bind(sale.status)
        .bind(sale.pos_status)
        .bind(sale.is_quick_sale)
        .bind(sale.voids_sale_id)
        .bind(sale.idempotency_key.as_deref())
        .bind(sale.notes.as_deref())
        .bind(sale.payment_method_id)
        .bind(sale.at)
        .fetch_one(&mut *conn)
        .await?;

    debug!(sale_id = row.id, sale_number = %row.sale_number, status = %row.status, "Inserted sale");
    Ok(row)
}

pub async fn insert_line(conn: &mut SqliteConnection, sale_id: i64, line: &NewSaleLine) -> DbResult<SaleLine> {
    let sql = format!(
        r#"
        INSERT INTO sale_details (
            sale_id, product_id, description, quantity_milli, unit_price_cents,
            discount_bps, discount_cents, tax_id, tax_cents, line_total_cents, serial_numbers
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        RETURNING {LINE_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, SaleLine>(&sql)
        .bind(sale_id)
        .bind(line.product_id)
        .bind(line.description.as_deref())
        .bind(line.quantity_milli)
        .bind(line.unit_price_cents)
        .bind(line.discount_bps)
        .bind(line.discount_cents)
        .bind(line.tax_id)
        .bind(line.tax_cents)
        .bind(line.line_total_cents)
        .bind(line.serial_numbers.as_deref())
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn insert_promotion(
    conn: &mut SqliteConnection,
    sale_id: i64,
    promotion_id: i64,
    discount_cents: i64,
) -> DbResult<AppliedPromotion> {
    let row = sqlx::query_as::<_, AppliedPromotion>(
        r#"
        INSERT INTO sale_promotions (sale_id, promotion_id, discount_cents)
        VALUES (?1, ?2, ?3)
        RETURNING id, sale_id, promotion_id, discount_cents
        "#,
    )
    .bind(sale_id)
    .bind(promotion_id)
    .bind(discount_cents)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Non-deleted sale `id` of `company_id`.
pub async fn find(conn: &mut SqliteConnection, company_id: i64, id: i64) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1 AND company_id = ?2 AND is_deleted = 0");
    let row = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn lines(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<SaleLine>> {
    let sql = format!("SELECT {LINE_COLUMNS} FROM sale_details WHERE sale_id = ?1 ORDER BY id");
    let rows = sqlx::query_as::<_, SaleLine>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

pub async fn promotions(conn: &mut SqliteConnection, sale_id: i64) -> DbResult<Vec<AppliedPromotion>> {
    let rows = sqlx::query_as::<_, AppliedPromotion>(
        "SELECT id, sale_id, promotion_id, discount_cents FROM sale_promotions WHERE sale_id = ?1 ORDER BY id",
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Header, lines and promotions of a non-deleted sale.
pub async fn document(conn: &mut SqliteConnection, company_id: i64, id: i64) -> DbResult<Option<SaleDocument>> {
    let Some(sale) = find(conn, company_id, id).await? else {
        return Ok(None);
    };
    let lines = lines(conn, sale.id).await?;
    let promotions = promotions(conn, sale.id).await?;
    Ok(Some(SaleDocument {
        sale,
        lines,
        promotions,
    }))
}

/// DRAFT → COMPLETED with the final paid amount.
pub async fn complete_draft(
    conn: &mut SqliteConnection,
    company_id: i64,
    id: i64,
    paid_cents: i64,
    at: DateTime<Utc>,
) -> DbResult<Option<Sale>> {
    let sql = format!(
        r#"
        UPDATE sales SET
            status = 'COMPLETED',
            pos_status = 'COMPLETED',
            paid_cents = ?3,
            updated_at = ?4
        WHERE id = ?1 AND company_id = ?2 AND status = 'DRAFT' AND is_deleted = 0
        RETURNING {SALE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .bind(company_id)
        .bind(paid_cents)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

/// `expected` → VOID. The pos_status is left as it was.
pub async fn mark_void(
    conn: &mut SqliteConnection,
    company_id: i64,
    id: i64,
    expected: SaleStatus,
    at: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE sales SET status = 'VOID', updated_at = ?4
        WHERE id = ?1 AND company_id = ?2 AND status = ?3 AND is_deleted = 0
        "#,
    )
    .bind(id)
    .bind(company_id)
    .bind(expected)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

// =============================================================================
// Pool-Level Operations
// =============================================================================

/// Repository for sale reads and standalone status flips.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    pub async fn get(&self, company_id: i64, id: i64) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, company_id, id).await
    }

    pub async fn document(&self, company_id: i64, id: i64) -> DbResult<Option<SaleDocument>> {
        let mut conn = self.pool.acquire().await?;
        document(&mut conn, company_id, id).await
    }

    /// Recent sales of a company, newest first.
    pub async fn list(&self, company_id: i64, status: Option<SaleStatus>, limit: u32) -> DbResult<Vec<Sale>> {
        let sql = format!(
            r#"
            SELECT {SALE_COLUMNS} FROM sales
            WHERE company_id = ?1 AND is_deleted = 0 AND (?2 IS NULL OR status = ?2)
            ORDER BY id DESC
            LIMIT ?3
            "#
        );
        let rows = sqlx::query_as::<_, Sale>(&sql)
            .bind(company_id)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// The void document that reverses `sale_id`, if any.
    pub async fn void_of(&self, company_id: i64, sale_id: i64) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE company_id = ?1 AND voids_sale_id = ?2");
        let row = sqlx::query_as::<_, Sale>(&sql)
            .bind(company_id)
            .bind(sale_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// DRAFT sale: pos_status `from` → `to`.
    pub async fn set_pos_status(
        &self,
        company_id: i64,
        id: i64,
        from: PosStatus,
        to: PosStatus,
    ) -> DbResult<Option<Sale>> {
        let sql = format!(
            r#"
            UPDATE sales SET pos_status = ?4, updated_at = ?5
            WHERE id = ?1 AND company_id = ?2 AND status = 'DRAFT' AND pos_status = ?3 AND is_deleted = 0
            RETURNING {SALE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .bind(company_id)
            .bind(from)
            .bind(to)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Sets notes and/or payment method; `None` keeps the current value.
    /// Amounts and status are never touched here.
    pub async fn update_details(
        &self,
        company_id: i64,
        id: i64,
        notes: Option<&str>,
        payment_method_id: Option<i64>,
    ) -> DbResult<Option<Sale>> {
        let sql = format!(
            r#"
            UPDATE sales
            SET notes = COALESCE(?3, notes),
                payment_method_id = COALESCE(?4, payment_method_id),
                updated_at = ?5
            WHERE id = ?1 AND company_id = ?2 AND is_deleted = 0
            RETURNING {SALE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .bind(company_id)
            .bind(notes)
            .bind(payment_method_id)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;
        if let Some(sale) = &row {
            debug!(sale_id = sale.id, "Updated sale details");
        }
        Ok(row)
    }

    /// Soft-deletes a DRAFT sale. Returns whether a row changed.
    pub async fn soft_delete(&self, company_id: i64, id: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sales SET is_deleted = 1, updated_at = ?3
            WHERE id = ?1 AND company_id = ?2 AND status = 'DRAFT' AND is_deleted = 0
            "#,
        )
        .bind(id)
        .bind(company_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
