//! Client idempotency keys, unique per company.
//!
//! The key is inserted inside the document's transaction. A concurrent
//! request with the same key fails that insert with a unique violation,
//! rolls back, and returns the document recorded by the winner.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::DbResult;
use keystone_core::IdempotencyRecord;

pub async fn find(conn: &mut SqliteConnection, company_id: i64, key: &str) -> DbResult<Option<IdempotencyRecord>> {
    let row = sqlx::query_as::<_, IdempotencyRecord>(
        "SELECT company_id, key, operation, document_id, created_at FROM idempotency_keys WHERE company_id = ?1 AND key = ?2",
    )
    .bind(company_id)
    .bind(key)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Fails with `DbError::UniqueViolation` if the key is already recorded.
pub async fn insert(
    conn: &mut SqliteConnection,
    company_id: i64,
    key: &str,
    operation: &str,
    document_id: i64,
    at: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO idempotency_keys (company_id, key, operation, document_id, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(company_id)
    .bind(key)
    .bind(operation)
    .bind(document_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Repository for idempotency key lookups.
#[derive(Debug, Clone)]
pub struct IdempotencyRepository {
    pool: SqlitePool,
}

impl IdempotencyRepository {
    /// Creates a new IdempotencyRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IdempotencyRepository { pool }
    }

    pub async fn find(&self, company_id: i64, key: &str) -> DbResult<Option<IdempotencyRecord>> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, company_id, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_key_is_unique_per_company() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        insert(&mut tx, 1, "k-1", "create_sale", 10, now).await.unwrap();
        insert(&mut tx, 2, "k-1", "create_sale", 20, now).await.unwrap();
        let err = insert(&mut tx, 1, "k-1", "create_sale", 30, now).await.unwrap_err();
        assert!(err.is_unique_violation());
        tx.commit().await.unwrap();

        let record = db.idempotency().find(1, "k-1").await.unwrap().unwrap();
        assert_eq!(record.document_id, 10);
        assert_eq!(record.operation, "create_sale");
        assert!(db.idempotency().find(3, "k-1").await.unwrap().is_none());
    }
}
