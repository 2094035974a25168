//! # Stock Transfer Repository
//!
//! Transfer headers and their lines.
//!
//! Status changes go through [`apply_transition`], a single guarded UPDATE
//! whose WHERE clause lists the states the action may start from. Two
//! racing `complete` calls cannot both match: the second one waits on the
//! write lock and then finds the row already COMPLETED.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use keystone_core::{StockTransfer, StockTransferDocument, StockTransferLine, TransferAction, TransferStatus};

const TRANSFER_COLUMNS: &str = "id, company_id, transfer_number, from_location_id, to_location_id, \
     status, notes, created_by, approved_by, approved_at, completed_at, cancelled_at, \
     idempotency_key, created_at, updated_at";

const LINE_COLUMNS: &str = "id, transfer_id, product_id, quantity_milli, received_quantity_milli";

/// Header values for [`insert_transfer`].
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub company_id: i64,
    pub transfer_number: String,
    pub from_location_id: i64,
    pub to_location_id: i64,
    pub notes: Option<String>,
    pub created_by: i64,
    pub idempotency_key: Option<String>,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

pub async fn insert_transfer(conn: &mut SqliteConnection, transfer: &NewTransfer) -> DbResult<StockTransfer> {
    let sql = format!(
        r#"
        INSERT INTO stock_transfers (
            company_id, transfer_number, from_location_id, to_location_id, status,
            notes, created_by, idempotency_key, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5, ?6, ?7, ?8, ?8)
        RETURNING {TRANSFER_COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, StockTransfer>(&sql)
        .bind(transfer.company_id)
        .bind(&transfer.transfer_number)
        .bind(transfer.from_location_id)
        .bind(transfer.to_location_id)
        .bind(transfer.notes.as_deref())
        .bind(transfer.created_by)
        .bind(transfer.idempotency_key.as_deref())
        .bind(transfer.at)
        .fetch_one(&mut *conn)
        .await?;

    debug!(transfer_id = row.id, transfer_number = %row.transfer_number, "Inserted stock transfer");
    Ok(row)
}

pub async fn insert_line(
    conn: &mut SqliteConnection,
    transfer_id: i64,
    product_id: i64,
    quantity_milli: i64,
) -> DbResult<StockTransferLine> {
    let sql = format!(
        r#"
        INSERT INTO stock_transfer_details (transfer_id, product_id, quantity_milli, received_quantity_milli)
        VALUES (?1, ?2, ?3, 0)
        RETURNING {LINE_COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, StockTransferLine>(&sql)
        .bind(transfer_id)
        .bind(product_id)
        .bind(quantity_milli)
        .fetch_one(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn find(conn: &mut SqliteConnection, company_id: i64, id: i64) -> DbResult<Option<StockTransfer>> {
    let sql = format!("SELECT {TRANSFER_COLUMNS} FROM stock_transfers WHERE id = ?1 AND company_id = ?2");
    let row = sqlx::query_as::<_, StockTransfer>(&sql)
        .bind(id)
        .bind(company_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

pub async fn lines(conn: &mut SqliteConnection, transfer_id: i64) -> DbResult<Vec<StockTransferLine>> {
    let sql = format!("SELECT {LINE_COLUMNS} FROM stock_transfer_details WHERE transfer_id = ?1 ORDER BY id");
    let rows = sqlx::query_as::<_, StockTransferLine>(&sql)
        .bind(transfer_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

pub async fn document(
    conn: &mut SqliteConnection,
    company_id: i64,
    id: i64,
) -> DbResult<Option<StockTransferDocument>> {
    let Some(transfer) = find(conn, company_id, id).await? else {
        return Ok(None);
    };
    let lines = lines(conn, transfer.id).await?;
    Ok(Some(StockTransferDocument { transfer, lines }))
}

fn transition_sql(action: TransferAction) -> String {
    let allowed = action
        .allowed_from()
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    let stamps = match action {
        TransferAction::Approve => "approved_by = ?4, approved_at = ?5,",
        TransferAction::Complete => {
            "approved_by = COALESCE(approved_by, ?4), approved_at = COALESCE(approved_at, ?5), completed_at = ?5,"
        }
        TransferAction::Cancel => "cancelled_at = ?5,",
    };

    format!(
        r#"
        UPDATE stock_transfers SET
            status = ?3,
            {stamps}
            updated_at = ?5
        WHERE id = ?1 AND company_id = ?2 AND status IN ({allowed})
        RETURNING {TRANSFER_COLUMNS}
        "#
    )
}

/// Moves the header to `action.target()` if its status is one the action
/// may start from. `None` when the transfer is missing or in another state.
pub async fn apply_transition(
    conn: &mut SqliteConnection,
    company_id: i64,
    id: i64,
    action: TransferAction,
    user_id: i64,
    at: DateTime<Utc>,
) -> DbResult<Option<StockTransfer>> {
    let sql = transition_sql(action);
    let row = sqlx::query_as::<_, StockTransfer>(&sql)
        .bind(id)
        .bind(company_id)
        .bind(action.target())
        .bind(user_id)
        .bind(at)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(transfer) = &row {
        debug!(transfer_id = id, %action, status = %transfer.status, "Transfer transitioned");
    }
    Ok(row)
}

/// Records every line of a completed transfer as fully received.
pub async fn mark_received(conn: &mut SqliteConnection, transfer_id: i64) -> DbResult<u64> {
    let result = sqlx::query(
        "UPDATE stock_transfer_details SET received_quantity_milli = quantity_milli WHERE transfer_id = ?1",
    )
    .bind(transfer_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Pool-Level Reads
// =============================================================================

/// Repository for stock transfer reads.
#[derive(Debug, Clone)]
pub struct TransferRepository {
    pool: SqlitePool,
}

impl TransferRepository {
    /// Creates a new TransferRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransferRepository { pool }
    }

    pub async fn get(&self, company_id: i64, id: i64) -> DbResult<Option<StockTransfer>> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, company_id, id).await
    }

    pub async fn document(&self, company_id: i64, id: i64) -> DbResult<Option<StockTransferDocument>> {
        let mut conn = self.pool.acquire().await?;
        document(&mut conn, company_id, id).await
    }

    /// Transfers touching a location (as source or destination), newest first.
    pub async fn list(
        &self,
        company_id: i64,
        location_id: Option<i64>,
        status: Option<TransferStatus>,
        limit: u32,
    ) -> DbResult<Vec<StockTransfer>> {
        let sql = format!(
            r#"
            SELECT {TRANSFER_COLUMNS} FROM stock_transfers
            WHERE company_id = ?1
              AND (?2 IS NULL OR from_location_id = ?2 OR to_location_id = ?2)
              AND (?3 IS NULL OR status = ?3)
            ORDER BY id DESC
            LIMIT ?4
            "#
        );
        let rows = sqlx::query_as::<_, StockTransfer>(&sql)
            .bind(company_id)
            .bind(location_id)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
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

    struct Fixture {
        db: Database,
        company: i64,
        from: i64,
        to: i64,
        product: i64,
    }

    async fn setup() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let company = db.catalog().insert_company("Acme").await.unwrap().id;
        let from = db.catalog().insert_location(company, "Warehouse").await.unwrap().id;
        let to = db.catalog().insert_location(company, "Shop").await.unwrap().id;
        let product = db
            .catalog()
            .insert_product(&NewProduct {
                company_id: company,
                category_id: None,
                sku: "W-1".to_string(),
                name: "Widget".to_string(),
                price_cents: 100,
                tax_id: None,
            })
            .await
            .unwrap()
            .id;
        Fixture {
            db,
            company,
            from,
            to,
            product,
        }
    }

    async fn pending(f: &Fixture) -> StockTransfer {
        let mut tx = f.db.begin().await.unwrap();
        let transfer = insert_transfer(
            &mut tx,
            &NewTransfer {
                company_id: f.company,
                transfer_number: "TRF-000001".to_string(),
                from_location_id: f.from,
                to_location_id: f.to,
                notes: None,
                created_by: 1,
                idempotency_key: None,
                at: Utc::now(),
            },
        )
        .await
        .unwrap();
        insert_line(&mut tx, transfer.id, f.product, 4000).await.unwrap();
        tx.commit().await.unwrap();
        transfer
    }

    #[tokio::test]
    async fn test_approve_then_complete() {
        let f = setup().await;
        let transfer = pending(&f).await;
        assert_eq!(transfer.status, TransferStatus::Pending);

        let mut tx = f.db.begin().await.unwrap();
        let approved = apply_transition(&mut tx, f.company, transfer.id, TransferAction::Approve, 7, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(approved.approved_by, Some(7));

        let completed = apply_transition(&mut tx, f.company, transfer.id, TransferAction::Complete, 9, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completed.status, TransferStatus::Completed);
        assert_eq!(completed.approved_by, Some(7));
        assert!(completed.completed_at.is_some());

        assert_eq!(mark_received(&mut tx, transfer.id).await.unwrap(), 1);
        tx.commit().await.unwrap();

        let doc = f.db.transfers().document(f.company, transfer.id).await.unwrap().unwrap();
        assert_eq!(doc.lines[0].received_quantity_milli, 4000);
    }

    #[tokio::test]
    async fn test_terminal_state_refuses_actions() {
        let f = setup().await;
        let transfer = pending(&f).await;

        let mut tx = f.db.begin().await.unwrap();
        apply_transition(&mut tx, f.company, transfer.id, TransferAction::Cancel, 1, Utc::now())
            .await
            .unwrap()
            .unwrap();
        for action in [TransferAction::Approve, TransferAction::Complete, TransferAction::Cancel] {
            let refused = apply_transition(&mut tx, f.company, transfer.id, action, 1, Utc::now())
                .await
                .unwrap();
            assert!(refused.is_none(), "{action} should be refused");
        }
    }

    #[tokio::test]
    async fn test_other_company_cannot_see_transfer() {
        let f = setup().await;
        let transfer = pending(&f).await;
        assert!(f.db.transfers().get(f.company + 1, transfer.id).await.unwrap().is_none());

        let listed = f
            .db
            .transfers()
            .list(f.company, Some(f.to), Some(TransferStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
