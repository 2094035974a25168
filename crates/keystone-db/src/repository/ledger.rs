//! Ledger postings, one row per `(company_id, reference)`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use keystone_core::{LedgerEntry, Money};

const COLUMNS: &str = "id, company_id, reference, debit_cents, credit_cents, created_by, created_at";

/// Repository for ledger postings.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    /// Posts `amount` under `reference`: positive credits, negative debits.
    ///
    /// Returns `false` when the reference was already posted, so a
    /// redelivered side effect does not double-post.
    pub async fn post(
        &self,
        company_id: i64,
        reference: &str,
        amount: Money,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let (debit, credit) = if amount.is_negative() {
            (-amount.cents(), 0)
        } else {
            (0, amount.cents())
        };

        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (company_id, reference, debit_cents, credit_cents, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (company_id, reference) DO NOTHING
            "#,
        )
        .bind(company_id)
        .bind(reference)
        .bind(debit)
        .bind(credit)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        let posted = result.rows_affected() == 1;
        debug!(company_id, reference = %reference, amount = %amount, posted, "Ledger post");
        Ok(posted)
    }

    pub async fn find_by_reference(&self, company_id: i64, reference: &str) -> DbResult<Option<LedgerEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM ledger_entries WHERE company_id = ?1 AND reference = ?2");
        let row = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(company_id)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list(&self, company_id: i64) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM ledger_entries WHERE company_id = ?1 ORDER BY id");
        let rows = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(company_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Σ(credit − debit) across a company's postings.
    pub async fn balance(&self, company_id: i64) -> DbResult<Money> {
        let cents: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(credit_cents - debit_cents) FROM ledger_entries WHERE company_id = ?1",
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(Money::from_cents(cents.unwrap_or(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_post_is_idempotent_per_reference() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let company = db.catalog().insert_company("Acme").await.unwrap().id;
        let ledger = db.ledger();

        assert!(ledger.post(company, "INV-000001", Money::from_cents(2300), 1, Utc::now()).await.unwrap());
        assert!(!ledger.post(company, "INV-000001", Money::from_cents(2300), 1, Utc::now()).await.unwrap());
        assert!(ledger.post(company, "INV-000002", Money::from_cents(-2300), 1, Utc::now()).await.unwrap());

        let entry = ledger.find_by_reference(company, "INV-000002").await.unwrap().unwrap();
        assert_eq!(entry.debit_cents, 2300);
        assert_eq!(entry.credit_cents, 0);
        assert_eq!(ledger.list(company).await.unwrap().len(), 2);
        assert_eq!(ledger.balance(company).await.unwrap(), Money::zero());
    }
}
