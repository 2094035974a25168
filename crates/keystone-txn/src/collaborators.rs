//! # Collaborators
//!
//! Read-only and best-effort services the coordinators call into. Each one
//! is a trait so tests can substitute a double; the `Sql*` types are the
//! production implementations over the Keystone database.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┬─────────────────────┐
//! │ Trait                │ Called by                │ When                │
//! ├──────────────────────┼──────────────────────────┼─────────────────────┤
//! │ TaxLookup            │ SaleCoordinator          │ pricing, before tx  │
//! │ PromotionEvaluator   │ SaleCoordinator          │ pricing, before tx  │
//! │ LedgerPoster         │ SideEffectProcessor      │ after commit        │
//! │ LoyaltyAwarder       │ SideEffectProcessor      │ after commit        │
//! └──────────────────────┴──────────────────────────┴─────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use keystone_core::promotion::{self, PromotionDiscount, PromotionQuery};
use keystone_core::types::loyalty_points;
use keystone_core::{Money, Rate};
use keystone_db::Database;

use crate::error::{TxnError, TxnResult};

// =============================================================================
// Traits
// =============================================================================

/// Percentage rate of a tax code.
#[async_trait]
pub trait TaxLookup: Send + Sync {
    async fn rate(&self, company_id: i64, tax_id: i64) -> TxnResult<Rate>;
}

/// Promotions whose minimum-amount and scope conditions hold for a cart.
#[async_trait]
pub trait PromotionEvaluator: Send + Sync {
    async fn evaluate(&self, company_id: i64, query: &PromotionQuery) -> TxnResult<Vec<PromotionDiscount>>;
}

/// Posts a debit/credit row. Must be idempotent on `(company_id, reference)`;
/// returns `false` when the reference was already posted.
#[async_trait]
pub trait LedgerPoster: Send + Sync {
    async fn post(&self, company_id: i64, reference: &str, amount: Money, user_id: i64) -> TxnResult<bool>;
}

/// Credits loyalty points for a completed sale. Must be idempotent on
/// `sale_id`; returns `false` when nothing was credited.
#[async_trait]
pub trait LoyaltyAwarder: Send + Sync {
    async fn award(&self, company_id: i64, customer_id: i64, sale_id: i64, amount: Money) -> TxnResult<bool>;
}

// =============================================================================
// SQL Implementations
// =============================================================================

#[derive(Debug, Clone)]
pub struct SqlTaxLookup {
    db: Database,
}

impl SqlTaxLookup {
    pub fn new(db: Database) -> Self {
        SqlTaxLookup { db }
    }
}

#[async_trait]
impl TaxLookup for SqlTaxLookup {
    async fn rate(&self, company_id: i64, tax_id: i64) -> TxnResult<Rate> {
        let tax = self
            .db
            .catalog()
            .tax(company_id, tax_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Tax", tax_id))?;
        Ok(tax.rate())
    }
}

/// Evaluates the company's active promotions against today's date (UTC).
#[derive(Debug, Clone)]
pub struct SqlPromotionEvaluator {
    db: Database,
}

impl SqlPromotionEvaluator {
    pub fn new(db: Database) -> Self {
        SqlPromotionEvaluator { db }
    }
}

#[async_trait]
impl PromotionEvaluator for SqlPromotionEvaluator {
    async fn evaluate(&self, company_id: i64, query: &PromotionQuery) -> TxnResult<Vec<PromotionDiscount>> {
        let active = self.db.catalog().active_promotions(company_id).await?;
        let matched = promotion::evaluate(&active, query, Utc::now().date_naive());
        debug!(
            company_id,
            customer_id = query.customer_id,
            active = active.len(),
            matched = matched.len(),
            "Promotions evaluated"
        );
        Ok(matched)
    }
}

#[derive(Debug, Clone)]
pub struct SqlLedgerPoster {
    db: Database,
}

impl SqlLedgerPoster {
    pub fn new(db: Database) -> Self {
        SqlLedgerPoster { db }
    }
}

#[async_trait]
impl LedgerPoster for SqlLedgerPoster {
    async fn post(&self, company_id: i64, reference: &str, amount: Money, user_id: i64) -> TxnResult<bool> {
        Ok(self
            .db
            .ledger()
            .post(company_id, reference, amount, user_id, Utc::now())
            .await?)
    }
}

/// Awards `floor(amount × points_per_currency)` points, using the company's
/// rate or `default_points_per_currency` when it has none.
#[derive(Debug, Clone)]
pub struct SqlLoyaltyAwarder {
    db: Database,
    default_points_per_currency: i64,
}

impl SqlLoyaltyAwarder {
    pub fn new(db: Database, default_points_per_currency: i64) -> Self {
        SqlLoyaltyAwarder {
            db,
            default_points_per_currency,
        }
    }
}

#[async_trait]
impl LoyaltyAwarder for SqlLoyaltyAwarder {
    async fn award(&self, company_id: i64, customer_id: i64, sale_id: i64, amount: Money) -> TxnResult<bool> {
        let loyalty = self.db.loyalty();
        let rate = loyalty
            .points_per_currency(company_id, self.default_points_per_currency)
            .await?;
        let points = loyalty_points(amount, rate);
        if points == 0 {
            debug!(company_id, customer_id, sale_id, "No loyalty points earned");
            return Ok(false);
        }
        Ok(loyalty.award(company_id, customer_id, sale_id, points, Utc::now()).await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
