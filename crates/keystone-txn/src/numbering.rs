//! # Numbering Sequence Service
//!
//! Hands out document numbers inside the caller's transaction.
//!
//! ## Next Number
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  next_number(tx, Sale, company 1, location 4)                          │
//! │                                                                         │
//! │  1. UPDATE ... current_number + 1 ... RETURNING  (counter "sale")      │
//! │        │                                                                │
//! │        ├── row ──────────────────────────────► "INV-000042"            │
//! │        │                                                                │
//! │        └── no row                                                       │
//! │              ├── custom type / auto-provision off ─► NotFound          │
//! │              └── INSERT default row (INV-, width 6, current 0)         │
//! │                    then UPDATE again                                    │
//! │                      ├── row ────────────────► "INV-000001"            │
//! │                      └── no row ─────────────► Invariant               │
//! │                                                                         │
//! │  Date-bucketed types (purchase, collection) use counter                │
//! │  "purchase@20260319", one row per location and day:                    │
//! │                                        "PUR-4-20260319-0001"           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The UPDATE is the first write of the transaction, so SQLite takes the
//! write lock there. A second caller blocks until the first commits or rolls
//! back, then increments the committed value. A rolled-back number is never
//! reissued; gaps are allowed, duplicates are not.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, error, info};

use keystone_core::numbering::{
    format_number, CreateNumberingSequenceRequest, NumberingScheme, UpdateNumberingSequenceRequest,
    DEFAULT_SEQUENCE_LENGTH,
};
use keystone_core::{DocumentType, NumberingSequence, ValidationError};
use keystone_db::repository::numbering;
use keystone_db::Database;

use crate::error::{TxnError, TxnResult};

/// Document number generation and sequence administration.
#[derive(Debug, Clone)]
pub struct NumberingService {
    db: Database,
    auto_provision: bool,
}

impl NumberingService {
    pub fn new(db: Database, auto_provision: bool) -> Self {
        NumberingService { db, auto_provision }
    }

    /// Issues the next number for `document` in the caller's transaction.
    pub async fn next_number(
        &self,
        conn: &mut SqliteConnection,
        document: &DocumentType,
        company_id: i64,
        location_id: Option<i64>,
    ) -> TxnResult<String> {
        self.next_number_at(conn, document, company_id, location_id, Utc::now())
            .await
    }

    /// [`next_number`](Self::next_number) with an explicit clock; the date
    /// picks the bucket for date-bucketed types.
    pub async fn next_number_at(
        &self,
        conn: &mut SqliteConnection,
        document: &DocumentType,
        company_id: i64,
        location_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> TxnResult<String> {
        let today = now.date_naive();
        let counter = document.counter_name(today);

        let sequence = match numbering::increment(conn, company_id, location_id, &counter, now).await? {
            Some(seq) => seq,
            None => {
                self.provision(conn, document, company_id, location_id, &counter, now)
                    .await?;
                numbering::increment(conn, company_id, location_id, &counter, now)
                    .await?
                    .ok_or_else(|| {
                        error!(
                            company_id,
                            ?location_id,
                            counter = %counter,
                            "Sequence increment affected no rows after provisioning"
                        );
                        TxnError::Invariant(format!("sequence '{counter}' did not advance"))
                    })?
            }
        };

        let number = format_number(document, &sequence, location_id, today);
        debug!(company_id, ?location_id, document = %document, number = %number, "Issued document number");
        Ok(number)
    }

    async fn provision(
        &self,
        conn: &mut SqliteConnection,
        document: &DocumentType,
        company_id: i64,
        location_id: Option<i64>,
        counter: &str,
        now: DateTime<Utc>,
    ) -> TxnResult<()> {
        let missing = || TxnError::not_found("Numbering sequence", format!("{company_id}/{counter}"));

        let prefix = document.default_prefix().ok_or_else(missing)?;

        // Day buckets are created on demand per location; sequential
        // counters are created company-wide, and only when allowed.
        let scope = match document.scheme() {
            NumberingScheme::Daily { .. } => location_id,
            NumberingScheme::Sequential if self.auto_provision => None,
            NumberingScheme::Sequential => return Err(missing()),
        };

        if numbering::provision(conn, company_id, scope, counter, Some(prefix), DEFAULT_SEQUENCE_LENGTH, now).await? {
            info!(company_id, location_id = ?scope, counter = %counter, "Numbering sequence auto-provisioned");
        }
        Ok(())
    }

    // =========================================================================
    // Administration
    // =========================================================================

    pub async fn create_sequence(&self, req: &CreateNumberingSequenceRequest) -> TxnResult<NumberingSequence> {
        req.validate()?;

        let catalog = self.db.catalog();
        let company = catalog
            .company(req.company_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Company", req.company_id))?;
        if !company.is_active {
            return Err(TxnError::Validation(ValidationError::invalid(
                "company_id",
                "company is not active",
            )));
        }
        if let Some(location_id) = req.location_id {
            catalog
                .location(req.company_id, location_id)
                .await?
                .ok_or_else(|| TxnError::not_found("Location", location_id))?;
        }

        let seq = self.db.numbering().insert(req).await?;
        info!(company_id = seq.company_id, sequence_id = seq.id, name = %seq.name, "Numbering sequence created");
        Ok(seq)
    }

    pub async fn list_sequences(&self, company_id: i64, location_id: Option<i64>) -> TxnResult<Vec<NumberingSequence>> {
        Ok(self.db.numbering().list(company_id, location_id).await?)
    }

    pub async fn get_sequence(&self, company_id: i64, id: i64) -> TxnResult<NumberingSequence> {
        self.db
            .numbering()
            .get(company_id, id)
            .await?
            .ok_or_else(|| TxnError::not_found("Numbering sequence", id))
    }

    pub async fn update_sequence(
        &self,
        company_id: i64,
        id: i64,
        req: &UpdateNumberingSequenceRequest,
    ) -> TxnResult<NumberingSequence> {
        req.validate()?;
        Ok(self.db.numbering().update(company_id, id, req).await?)
    }

    pub async fn delete_sequence(&self, company_id: i64, id: i64) -> TxnResult<()> {
        self.db.numbering().delete(company_id, id).await?;
        info!(company_id, sequence_id = id, "Numbering sequence deleted");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
