//! # Stock Ledger
//!
//! The shared stock mutation primitive plus the manual adjustment document.
//!
//! ## Check-Then-Adjust
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Inside ONE transaction (write lock already held):                     │
//! │                                                                         │
//! │    available = quantity_on(location, product)                          │
//! │    available < requested ?  ──yes──►  InsufficientStock, roll back     │
//! │          │ no                                                           │
//! │          ▼                                                              │
//! │    adjust_stock(location, product, -requested)                         │
//! │                                                                         │
//! │  No commit boundary between the read and the write, so no other        │
//! │  writer can slip in between them.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use keystone_core::validation::validate_adjustment;
use keystone_core::{
    DocumentType, MovementCause, Quantity, StockAdjustment, StockAdjustmentRequest, StockLevel, StockRecord,
};
use keystone_db::repository::stock::{self, MovementContext, NewStockAdjustment};
use keystone_db::Database;

use crate::context::TenantContext;
use crate::error::{TxnError, TxnResult};
use crate::numbering::NumberingService;

// =============================================================================
// Transaction-Scoped Primitives
// =============================================================================

/// Upserts the stock record for (location, product) by `delta` and records
/// the movement. Does not check for negative results.
pub async fn adjust_stock(
    conn: &mut SqliteConnection,
    location_id: i64,
    product_id: i64,
    delta: Quantity,
    ctx: MovementContext<'_>,
) -> TxnResult<StockRecord> {
    Ok(stock::adjust(conn, location_id, product_id, delta, ctx).await?)
}

/// Fails with [`TxnError::InsufficientStock`] unless at least `requested`
/// is on hand.
pub async fn ensure_available(
    conn: &mut SqliteConnection,
    location_id: i64,
    product_id: i64,
    requested: Quantity,
) -> TxnResult<()> {
    let available = stock::quantity_on(conn, location_id, product_id).await?;
    if available < requested {
        warn!(
            location_id,
            product_id,
            available = %available,
            requested = %requested,
            "Insufficient stock"
        );
        return Err(TxnError::InsufficientStock {
            product_id,
            location_id,
            available,
            requested,
        });
    }
    Ok(())
}

/// Check-then-deduct of `quantity` (positive) in the caller's transaction.
pub async fn deduct_checked(
    conn: &mut SqliteConnection,
    location_id: i64,
    product_id: i64,
    quantity: Quantity,
    ctx: MovementContext<'_>,
) -> TxnResult<StockRecord> {
    ensure_available(conn, location_id, product_id, quantity).await?;
    adjust_stock(conn, location_id, product_id, -quantity, ctx).await
}

// =============================================================================
// Manual Adjustments
// =============================================================================

/// Result of [`StockLedger::adjust`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdjustmentOutcome {
    pub adjustment: StockAdjustment,
    pub stock: StockRecord,
}

/// Manual stock corrections and stock reads.
#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Database,
    numbering: NumberingService,
}

impl StockLedger {
    pub fn new(db: Database, numbering: NumberingService) -> Self {
        StockLedger { db, numbering }
    }

    /// Applies a signed correction at the caller's location under an `ADJ-`
    /// number. A negative delta may not take the stock below zero.
    pub async fn adjust(&self, ctx: &TenantContext, req: &StockAdjustmentRequest) -> TxnResult<AdjustmentOutcome> {
        validate_adjustment(req)?;
        let location_id = ctx.location()?;

        let catalog = self.db.catalog();
        catalog
            .location(ctx.company_id, location_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Location", location_id))?;
        if catalog
            .products_by_ids(ctx.company_id, &[req.product_id])
            .await?
            .is_empty()
        {
            return Err(TxnError::not_found("Product", req.product_id));
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let number = self
            .numbering
            .next_number_at(&mut tx, &DocumentType::StockAdjustment, ctx.company_id, Some(location_id), now)
            .await?;

        let movement = MovementContext {
            cause: MovementCause::Adjustment,
            reference: Some(number.as_str()),
            user_id: Some(ctx.user_id),
            at: now,
        };
        let record = if req.delta.is_negative() {
            deduct_checked(&mut tx, location_id, req.product_id, -req.delta, movement).await?
        } else {
            adjust_stock(&mut tx, location_id, req.product_id, req.delta, movement).await?
        };

        let adjustment = stock::insert_adjustment(
            &mut tx,
            &NewStockAdjustment {
                company_id: ctx.company_id,
                location_id,
                product_id: req.product_id,
                adjustment_number: &number,
                delta: req.delta,
                reason: req.reason.trim(),
                created_by: ctx.user_id,
                at: now,
            },
        )
        .await?;

        tx.commit().await?;

        info!(
            company_id = ctx.company_id,
            location_id,
            product_id = req.product_id,
            adjustment_number = %number,
            delta = %req.delta,
            quantity = %record.quantity(),
            "Stock adjusted"
        );
        Ok(AdjustmentOutcome {
            adjustment,
            stock: record,
        })
    }

    /// Current stock record; `None` if the product never moved at the location.
    pub async fn stock_level(&self, location_id: i64, product_id: i64) -> TxnResult<Option<StockRecord>> {
        Ok(self.db.stock().get(location_id, product_id).await?)
    }

    /// Stock on hand at one of the tenant's locations, by product name.
    pub async fn list_stock(
        &self,
        ctx: &TenantContext,
        location_id: i64,
        product_id: Option<i64>,
    ) -> TxnResult<Vec<StockLevel>> {
        self.owned_location(ctx, location_id).await?;
        Ok(self
            .db
            .stock()
            .list_for_location(ctx.company_id, location_id, product_id)
            .await?)
    }

    /// Adjustment history of one of the tenant's locations, newest first.
    pub async fn list_adjustments(&self, ctx: &TenantContext, location_id: i64) -> TxnResult<Vec<StockAdjustment>> {
        self.owned_location(ctx, location_id).await?;
        Ok(self.db.stock().adjustments(ctx.company_id, location_id).await?)
    }

    async fn owned_location(&self, ctx: &TenantContext, location_id: i64) -> TxnResult<()> {
        self.db
            .catalog()
            .location(ctx.company_id, location_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Location", location_id))?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::Fixture;

    fn request(product_id: i64, units: i64) -> StockAdjustmentRequest {
        StockAdjustmentRequest {
            product_id,
            delta: Quantity::from_units(units),
            reason: "cycle count".to_string(),
        }
    }

    #[tokio::test]
    async fn test_positive_adjustment_creates_record() {
        let fx = Fixture::new().await;
        let ledger = fx.stock_ledger();

        let outcome = ledger.adjust(&fx.ctx(), &request(fx.widget, 12)).await.unwrap();
        assert_eq!(outcome.stock.quantity(), Quantity::from_units(12));
        assert_eq!(outcome.adjustment.adjustment_number, "ADJ-000001");
        assert_eq!(outcome.adjustment.reason, "cycle count");

        let movements = fx.db.stock().movements(fx.shop, fx.widget, 10).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].cause, MovementCause::Adjustment);
        assert_eq!(movements[0].reference.as_deref(), Some("ADJ-000001"));
    }

    #[tokio::test]
    async fn test_negative_adjustment_cannot_oversell() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 3).await;
        let ledger = fx.stock_ledger();

        let err = ledger.adjust(&fx.ctx(), &request(fx.widget, -5)).await.unwrap_err();
        assert!(matches!(err, TxnError::InsufficientStock { product_id, .. } if product_id == fx.widget));
        assert_eq!(fx.quantity(fx.shop, fx.widget).await, Quantity::from_units(3));

        let outcome = ledger.adjust(&fx.ctx(), &request(fx.widget, -3)).await.unwrap();
        assert!(outcome.stock.quantity().is_zero());
    }

    #[tokio::test]
    async fn test_adjustment_validation() {
        let fx = Fixture::new().await;
        let ledger = fx.stock_ledger();

        let err = ledger.adjust(&fx.ctx(), &request(fx.widget, 0)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = ledger.adjust(&fx.ctx(), &request(9999, 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let no_location = TenantContext::new(fx.company, None, 1);
        let err = ledger.adjust(&no_location, &request(fx.widget, 1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_location_stock_listing() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 4).await;
        fx.set_stock(fx.shop, fx.gadget, 2).await;
        fx.set_stock(fx.warehouse, fx.taxed, 9).await;
        let ledger = fx.stock_ledger();

        let shop = ledger.list_stock(&fx.ctx(), fx.shop, None).await.unwrap();
        let names: Vec<_> = shop.iter().map(|l| l.product_name.as_str()).collect();
        assert_eq!(names, vec!["Gadget", "Widget"]);
        assert_eq!(shop[1].quantity(), Quantity::from_units(4));

        let widget = ledger.list_stock(&fx.ctx(), fx.shop, Some(fx.widget)).await.unwrap();
        assert_eq!(widget.len(), 1);
        assert_eq!(widget[0].sku, "W-1");

        let warehouse = ledger.list_stock(&fx.ctx(), fx.warehouse, None).await.unwrap();
        assert_eq!(warehouse.len(), 1);
        assert_eq!(warehouse[0].product_id, fx.taxed);

        let stranger = TenantContext::new(fx.company + 1, Some(fx.shop), 1);
        let err = ledger.list_stock(&stranger, fx.shop, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_adjustment_history_newest_first() {
        let fx = Fixture::new().await;
        let ledger = fx.stock_ledger();
        ledger.adjust(&fx.ctx(), &request(fx.widget, 5)).await.unwrap();
        ledger.adjust(&fx.ctx(), &request(fx.gadget, 2)).await.unwrap();

        let history = ledger.list_adjustments(&fx.ctx(), fx.shop).await.unwrap();
        let numbers: Vec<_> = history.iter().map(|a| a.adjustment_number.as_str()).collect();
        assert_eq!(numbers, vec!["ADJ-000002", "ADJ-000001"]);
        assert!(ledger.list_adjustments(&fx.ctx(), fx.warehouse).await.unwrap().is_empty());

        let stranger = TenantContext::new(fx.company + 1, None, 1);
        let err = ledger.list_adjustments(&stranger, fx.shop).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_deduct_checked_leaves_stock_on_failure() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 2).await;

        let mut tx = fx.db.begin().await.unwrap();
        let ctx = MovementContext {
            cause: MovementCause::Sale,
            reference: None,
            user_id: Some(1),
            at: Utc::now(),
        };
        let record = deduct_checked(&mut tx, fx.shop, fx.widget, Quantity::from_units(2), ctx)
            .await
            .unwrap();
        assert!(record.quantity().is_zero());
        let err = deduct_checked(&mut tx, fx.shop, fx.widget, Quantity::from_milli(1), ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        tx.rollback().await.unwrap();

        assert_eq!(fx.quantity(fx.shop, fx.widget).await, Quantity::from_units(2));
        let level = fx.stock_ledger().stock_level(fx.shop, fx.widget).await.unwrap().unwrap();
        assert_eq!(level.quantity(), Quantity::from_units(2));
    }
}
