//! # Numbering Sequence Repository
//!
//! Counter rows behind document numbers.
//!
//! ## Atomic Increment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE numbering_sequences                                            │
//! │     SET current_number = current_number + 1                            │
//! │   WHERE id = (most specific row for company/location/name)             │
//! │  RETURNING *                                                            │
//! │                                                                         │
//! │  One statement: read-modify-write happens under SQLite's write lock.   │
//! │  A concurrent caller blocks (busy_timeout) until this transaction      │
//! │  commits or rolls back, then increments the committed value.           │
//! │                                                                         │
//! │  Scope resolution: a row with location_id = ? wins over the            │
//! │  company-wide row (location_id IS NULL).                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use keystone_core::numbering::{
    CreateNumberingSequenceRequest, NumberingSequence, UpdateNumberingSequenceRequest,
};

const COLUMNS: &str =
    "id, company_id, location_id, name, prefix, sequence_length, current_number, created_at, updated_at";

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Increments the most specific counter for the scope and returns the
/// updated row. `None` when no row matches.
pub async fn increment(
    conn: &mut SqliteConnection,
    company_id: i64,
    location_id: Option<i64>,
    name: &str,
    now: DateTime<Utc>,
) -> DbResult<Option<NumberingSequence>> {
    let sql = format!(
        r#"
        UPDATE numbering_sequences
           SET current_number = current_number + 1,
               updated_at = ?4
         WHERE id = (
               SELECT id FROM numbering_sequences
                WHERE company_id = ?1
                  AND name = ?3
                  AND (location_id = ?2 OR location_id IS NULL)
                ORDER BY location_id IS NULL, id
                LIMIT 1)
        RETURNING {COLUMNS}
        "#
    );

    let row = sqlx::query_as::<_, NumberingSequence>(&sql)
        .bind(company_id)
        .bind(location_id)
        .bind(name)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

    if let Some(seq) = &row {
        debug!(
            company_id,
            sequence_id = seq.id,
            name = %name,
            current = seq.current_number,
            "Sequence incremented"
        );
    }
    Ok(row)
}

/// Inserts a counter row unless one already exists for the exact scope.
pub async fn provision(
    conn: &mut SqliteConnection,
    company_id: i64,
    location_id: Option<i64>,
    name: &str,
    prefix: Option<&str>,
    sequence_length: i64,
    now: DateTime<Utc>,
) -> DbResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO numbering_sequences (
            company_id, location_id, name, prefix, sequence_length,
            current_number, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(company_id)
    .bind(location_id)
    .bind(name)
    .bind(prefix)
    .bind(sequence_length)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let created = result.rows_affected() > 0;
    if created {
        debug!(company_id, ?location_id, name = %name, "Provisioned numbering sequence");
    }
    Ok(created)
}

// =============================================================================
// Administration
// =============================================================================

/// Repository for numbering sequence administration.
#[derive(Debug, Clone)]
pub struct NumberingRepository {
    pool: SqlitePool,
}

impl NumberingRepository {
    /// Creates a new NumberingRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NumberingRepository { pool }
    }

    /// Inserts a sequence; the counter starts at `start_from` (default 0).
    pub async fn insert(&self, req: &CreateNumberingSequenceRequest) -> DbResult<NumberingSequence> {
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO numbering_sequences (
                company_id, location_id, name, prefix, sequence_length,
                current_number, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            RETURNING {COLUMNS}
            "#
        );

        let seq = sqlx::query_as::<_, NumberingSequence>(&sql)
            .bind(req.company_id)
            .bind(req.location_id)
            .bind(req.name.trim())
            .bind(req.prefix.as_deref())
            .bind(req.sequence_length)
            .bind(req.start_from.unwrap_or(0))
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("numbering sequence", req.name.trim()),
                other => other,
            })?;

        debug!(sequence_id = seq.id, name = %seq.name, "Created numbering sequence");
        Ok(seq)
    }

    /// Sequences of a company. With a location, returns that location's rows
    /// plus the company-wide ones.
    pub async fn list(&self, company_id: i64, location_id: Option<i64>) -> DbResult<Vec<NumberingSequence>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS}
            FROM numbering_sequences
            WHERE company_id = ?1
              AND (?2 IS NULL OR location_id = ?2 OR location_id IS NULL)
            ORDER BY name, location_id
            "#
        );
        let rows = sqlx::query_as::<_, NumberingSequence>(&sql)
            .bind(company_id)
            .bind(location_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, company_id: i64, id: i64) -> DbResult<Option<NumberingSequence>> {
        let sql = format!("SELECT {COLUMNS} FROM numbering_sequences WHERE id = ?1 AND company_id = ?2");
        let row = sqlx::query_as::<_, NumberingSequence>(&sql)
            .bind(id)
            .bind(company_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Applies the non-empty fields of `req`. The counter is never touched.
    pub async fn update(
        &self,
        company_id: i64,
        id: i64,
        req: &UpdateNumberingSequenceRequest,
    ) -> DbResult<NumberingSequence> {
        let sql = format!(
            r#"
            UPDATE numbering_sequences SET
                name = COALESCE(?3, name),
                prefix = COALESCE(?4, prefix),
                sequence_length = COALESCE(?5, sequence_length),
                updated_at = ?6
            WHERE id = ?1 AND company_id = ?2
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, NumberingSequence>(&sql)
            .bind(id)
            .bind(company_id)
            .bind(req.name.as_deref().map(str::trim))
            .bind(req.prefix.as_deref())
            .bind(req.sequence_length)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| DbError::not_found("Numbering sequence", id))
    }

    pub async fn delete(&self, company_id: i64, id: i64) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM numbering_sequences WHERE id = ?1 AND company_id = ?2")
            .bind(id)
            .bind(company_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Numbering sequence", id));
        }
        debug!(sequence_id = id, "Deleted numbering sequence");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn setup() -> (Database, i64, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let company = db.catalog().insert_company("Acme").await.unwrap();
        let location = db.catalog().insert_location(company.id, "Main").await.unwrap();
        (db, company.id, location.id)
    }

    fn request(company_id: i64, location_id: Option<i64>, prefix: &str) -> CreateNumberingSequenceRequest {
        CreateNumberingSequenceRequest {
            company_id,
            location_id,
            name: "sale".to_string(),
            prefix: Some(prefix.to_string()),
            sequence_length: 4,
            start_from: None,
        }
    }

    #[tokio::test]
    async fn test_location_row_wins_over_company_row() {
        let (db, company, location) = setup().await;
        let repo = db.numbering();
        repo.insert(&request(company, None, "CO-")).await.unwrap();
        repo.insert(&request(company, Some(location), "LOC-")).await.unwrap();

        let mut tx = db.begin().await.unwrap();
        let at_location = increment(&mut tx, company, Some(location), "sale", Utc::now())
            .await
            .unwrap()
            .unwrap();
        let company_wide = increment(&mut tx, company, None, "sale", Utc::now())
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(at_location.prefix.as_deref(), Some("LOC-"));
        assert_eq!(company_wide.prefix.as_deref(), Some("CO-"));
    }

    #[tokio::test]
    async fn test_increment_without_row_returns_none() {
        let (db, company, _) = setup().await;
        let mut tx = db.begin().await.unwrap();
        let row = increment(&mut tx, company, None, "quote", Utc::now()).await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_provision_is_idempotent_per_scope() {
        let (db, company, _) = setup().await;
        let mut tx = db.begin().await.unwrap();
        assert!(provision(&mut tx, company, None, "sale", Some("INV-"), 6, Utc::now()).await.unwrap());
        assert!(!provision(&mut tx, company, None, "sale", Some("XXX-"), 6, Utc::now()).await.unwrap());
        tx.commit().await.unwrap();

        let rows = db.numbering().list(company, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].prefix.as_deref(), Some("INV-"));
    }

    #[tokio::test]
    async fn test_duplicate_scope_is_rejected() {
        let (db, company, _) = setup().await;
        db.numbering().insert(&request(company, None, "A-")).await.unwrap();
        let err = db.numbering().insert(&request(company, None, "B-")).await.unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (db, company, _) = setup().await;
        let repo = db.numbering();
        let seq = repo.insert(&request(company, None, "A-")).await.unwrap();

        let updated = repo
            .update(
                company,
                seq.id,
                &UpdateNumberingSequenceRequest {
                    prefix: Some("B-".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.prefix.as_deref(), Some("B-"));
        assert_eq!(updated.sequence_length, 4);

        repo.delete(company, seq.id).await.unwrap();
        assert!(matches!(
            repo.delete(company, seq.id).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
