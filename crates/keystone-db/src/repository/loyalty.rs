//! # Loyalty Repository
//!
//! Per-company earning rate, per-customer balances and the award journal.
//!
//! An award is keyed by `sale_id` in `loyalty_transactions`. The journal
//! insert and the balance update share one transaction, so a redelivered
//! award either finds the journal row (no-op) or applies both.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use keystone_core::LoyaltyAccount;

/// Repository for loyalty settings and balances.
#[derive(Debug, Clone)]
pub struct LoyaltyRepository {
    pool: SqlitePool,
}

impl LoyaltyRepository {
    /// Creates a new LoyaltyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoyaltyRepository { pool }
    }

    /// Points per currency unit; `default` when the company has no row.
    pub async fn points_per_currency(&self, company_id: i64, default: i64) -> DbResult<i64> {
        let rate: Option<i64> =
            sqlx::query_scalar("SELECT points_per_currency FROM loyalty_settings WHERE company_id = ?1")
                .bind(company_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(rate.unwrap_or(default))
    }

    pub async fn set_points_per_currency(&self, company_id: i64, points: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_settings (company_id, points_per_currency) VALUES (?1, ?2)
            ON CONFLICT (company_id) DO UPDATE SET points_per_currency = excluded.points_per_currency
            "#,
        )
        .bind(company_id)
        .bind(points)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Credits `points` for `sale_id`. Returns `false` if that sale was
    /// already awarded.
    pub async fn award(
        &self,
        company_id: i64,
        customer_id: i64,
        sale_id: i64,
        points: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO loyalty_transactions (company_id, customer_id, sale_id, points, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (sale_id) DO NOTHING
            "#,
        )
        .bind(company_id)
        .bind(customer_id)
        .bind(sale_id)
        .bind(points)
        .bind(at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !inserted {
            tx.rollback().await?;
            debug!(company_id, customer_id, sale_id, "Loyalty award already applied");
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (customer_id, company_id, points, total_earned, updated_at)
            VALUES (?1, ?2, ?3, ?3, ?4)
            ON CONFLICT (customer_id) DO UPDATE SET
                points = points + excluded.points,
                total_earned = total_earned + excluded.total_earned,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(customer_id)
        .bind(company_id)
        .bind(points)
        .bind(at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(company_id, customer_id, sale_id, points, "Loyalty points awarded");
        Ok(true)
    }

    pub async fn account(&self, customer_id: i64) -> DbResult<Option<LoyaltyAccount>> {
        let row = sqlx::query_as::<_, LoyaltyAccount>(
            "SELECT customer_id, company_id, points, total_earned, updated_at FROM loyalty_accounts WHERE customer_id = ?1",
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
