//! # Side-Effect Queue Repository
//!
//! Durable queue of post-commit work (ledger postings, loyalty awards).
//!
//! ## Row Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  enqueue (inside the document's transaction)                           │
//! │       │  attempts = 0, next_attempt_at = now                           │
//! │       ▼                                                                 │
//! │  due(now) ──► worker runs it                                           │
//! │       │                                                                 │
//! │       ├── ok ──────► mark_completed      (completed_at set)            │
//! │       ├── error ───► mark_failed         (attempts+1, next_attempt_at) │
//! │       └── error, attempts exhausted ──► mark_dead_lettered             │
//! │                                                                         │
//! │  A row is pending while completed_at and dead_lettered_at are NULL.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use keystone_core::effects::{SideEffect, SideEffectPayload};

const COLUMNS: &str = "id, company_id, kind, reference, payload, attempts, last_error, next_attempt_at, \
     created_at, attempted_at, completed_at, dead_lettered_at";

/// Queues `payload` on the caller's transaction. It becomes visible to the
/// worker only when that transaction commits.
pub async fn enqueue(
    conn: &mut SqliteConnection,
    payload: &SideEffectPayload,
    at: DateTime<Utc>,
) -> DbResult<SideEffect> {
    let body = serde_json::to_string(payload)?;
    let sql = format!(
        r#"
        INSERT INTO side_effects (id, company_id, kind, reference, payload, attempts, next_attempt_at, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
        RETURNING {COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, SideEffect>(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(payload.company_id())
        .bind(payload.kind())
        .bind(payload.reference())
        .bind(body)
        .bind(at)
        .fetch_one(&mut *conn)
        .await?;

    debug!(effect_id = %row.id, kind = %row.kind, reference = %row.reference, "Side effect queued");
    Ok(row)
}

/// Repository for the side-effect worker.
#[derive(Debug, Clone)]
pub struct SideEffectRepository {
    pool: SqlitePool,
}

impl SideEffectRepository {
    /// Creates a new SideEffectRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SideEffectRepository { pool }
    }

    /// Pending rows whose `next_attempt_at` has passed, oldest first.
    pub async fn due(&self, now: DateTime<Utc>, limit: u32) -> DbResult<Vec<SideEffect>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM side_effects
            WHERE completed_at IS NULL AND dead_lettered_at IS NULL AND next_attempt_at <= ?1
            ORDER BY next_attempt_at, created_at, rowid
            LIMIT ?2
            "#
        );
        let rows = sqlx::query_as::<_, SideEffect>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<SideEffect>> {
        let sql = format!("SELECT {COLUMNS} FROM side_effects WHERE id = ?1");
        let row = sqlx::query_as::<_, SideEffect>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn mark_completed(&self, id: &str, at: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE side_effects SET
                attempts = attempts + 1, attempted_at = ?2, completed_at = ?2, last_error = NULL
            WHERE id = ?1 AND completed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Side effect", id));
        }
        Ok(())
    }

    /// Records a failed attempt and schedules the next one.
    pub async fn mark_failed(
        &self,
        id: &str,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE side_effects SET
                attempts = attempts + 1, attempted_at = ?4, last_error = ?2, next_attempt_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records the final failed attempt and parks the row.
    pub async fn mark_dead_lettered(&self, id: &str, error: &str, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE side_effects SET
                attempts = attempts + 1, attempted_at = ?3, last_error = ?2, dead_lettered_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(at)
        .execute(&self.pool)
        .await?;
        warn!(effect_id = %id, error = %error, "Side effect dead-lettered");
        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM side_effects WHERE completed_at IS NULL AND dead_lettered_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn dead_letters(&self, limit: u32) -> DbResult<Vec<SideEffect>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM side_effects WHERE dead_lettered_at IS NOT NULL ORDER BY dead_lettered_at DESC LIMIT ?1"
        );
        let rows = sqlx::query_as::<_, SideEffect>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Effects queued for a document reference, in queue order.
    pub async fn for_reference(&self, company_id: i64, reference: &str) -> DbResult<Vec<SideEffect>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM side_effects WHERE company_id = ?1 AND reference = ?2 ORDER BY created_at, rowid"
        );
        let rows = sqlx::query_as::<_, SideEffect>(&sql)
            .bind(company_id)
            .bind(reference)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use keystone_core::effects::SideEffectKind;
    use keystone_core::Money;

    fn ledger_payload() -> SideEffectPayload {
        SideEffectPayload::LedgerPost {
            company_id: 1,
            reference: "INV-000001".to_string(),
            amount: Money::from_cents(2300),
            user_id: 1,
        }
    }

    #[tokio::test]
    async fn test_enqueue_visible_only_after_commit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        let effect = enqueue(&mut tx, &ledger_payload(), now).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(db.side_effects().get(&effect.id).await.unwrap().is_none());

        let mut tx = db.begin().await.unwrap();
        let effect = enqueue(&mut tx, &ledger_payload(), now).await.unwrap();
        tx.commit().await.unwrap();

        let stored = db.side_effects().get(&effect.id).await.unwrap().unwrap();
        assert_eq!(stored.kind, SideEffectKind::LedgerPost);
        assert_eq!(stored.decode().unwrap(), ledger_payload());
        assert_eq!(db.side_effects().count_pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_effect_waits_for_next_attempt() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.side_effects();
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        let effect = enqueue(&mut tx, &ledger_payload(), now).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(repo.due(now, 10).await.unwrap().len(), 1);

        repo.mark_failed(&effect.id, "ledger offline", now + Duration::seconds(30), now)
            .await
            .unwrap();
        assert!(repo.due(now, 10).await.unwrap().is_empty());

        let later = repo.due(now + Duration::seconds(31), 10).await.unwrap();
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].attempts, 1);
        assert_eq!(later[0].last_error.as_deref(), Some("ledger offline"));

        repo.mark_completed(&effect.id, now).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 0);
        assert!(repo.mark_completed(&effect.id, now).await.is_err());
    }

    #[tokio::test]
    async fn test_dead_letter_leaves_queue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.side_effects();
        let now = Utc::now();

        let mut tx = db.begin().await.unwrap();
        let effect = enqueue(&mut tx, &ledger_payload(), now).await.unwrap();
        tx.commit().await.unwrap();

        repo.mark_dead_lettered(&effect.id, "gave up", now).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 0);
        assert_eq!(repo.dead_letters(10).await.unwrap().len(), 1);
        assert_eq!(repo.for_reference(1, "INV-000001").await.unwrap().len(), 1);
    }
}
