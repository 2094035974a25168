//! # Stock Transfer Coordinator
//!
//! Two-phase movement of stock between two locations of one company.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Transfer Lifecycle                               │
//! │                                                                         │
//! │   create ──► PENDING ──approve──► APPROVED                             │
//! │                 │  │                  │                                 │
//! │          cancel │  └────complete──────┴──► COMPLETED                   │
//! │                 ▼                          (source −qty, dest +qty)    │
//! │             CANCELLED                                                   │
//! │                                                                         │
//! │  create:   checks source stock, moves nothing                          │
//! │  complete: the only writer of stock for a transfer, exactly once,      │
//! │            guarded status UPDATE first, then check-then-deduct         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

use keystone_core::transfer::{transition, CreateStockTransferRequest};
use keystone_core::validation::validate_create_transfer;
use keystone_core::{
    DocumentType, MovementCause, Quantity, StockTransfer, StockTransferDocument, TransferAction, TransferStatus,
    ValidationError,
};
use keystone_db::repository::idempotency;
use keystone_db::repository::stock::MovementContext;
use keystone_db::repository::transfer::{self as transfers, NewTransfer};
use keystone_db::Database;

use crate::context::TenantContext;
use crate::error::{TxnError, TxnResult};
use crate::numbering::NumberingService;
use crate::stock::{adjust_stock, deduct_checked, ensure_available};

const CREATE_OPERATION: &str = "create_stock_transfer";

/// Stock transfer coordinator.
#[derive(Debug, Clone)]
pub struct TransferCoordinator {
    db: Database,
    numbering: NumberingService,
}

impl TransferCoordinator {
    pub fn new(db: Database, numbering: NumberingService) -> Self {
        TransferCoordinator { db, numbering }
    }

    /// Creates a PENDING transfer out of the caller's location. Every line
    /// must be covered by current source stock; nothing is deducted yet.
    pub async fn create_transfer(
        &self,
        ctx: &TenantContext,
        req: &CreateStockTransferRequest,
    ) -> TxnResult<StockTransferDocument> {
        let company_id = ctx.company_id;
        let from_location_id = ctx.location()?;
        validate_create_transfer(from_location_id, req)?;

        let key = req.idempotency_key.as_deref();
        if let Some(key) = key {
            if let Some(document) = self.replay(company_id, key).await? {
                return Ok(document);
            }
        }

        let catalog = self.db.catalog();
        let from = catalog.location(company_id, from_location_id).await?;
        let to = catalog.location(company_id, req.to_location_id).await?;
        if !matches!((&from, &to), (Some(f), Some(t)) if f.is_active && t.is_active) {
            warn!(company_id, from_location_id, to_location_id = req.to_location_id, "Transfer between invalid locations");
            return Err(ValidationError::invalid("to_location_id", "invalid locations").into());
        }

        let mut requested: BTreeMap<i64, Quantity> = BTreeMap::new();
        for item in &req.items {
            *requested.entry(item.product_id).or_insert_with(Quantity::zero) += item.quantity;
        }
        let product_ids: Vec<i64> = requested.keys().copied().collect();
        let known: HashSet<i64> = catalog
            .products_by_ids(company_id, &product_ids)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if let Some(missing) = product_ids.iter().find(|id| !known.contains(*id)) {
            return Err(TxnError::not_found("Product", missing));
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let transfer_number = self
            .numbering
            .next_number_at(&mut tx, &DocumentType::StockTransfer, company_id, Some(from_location_id), now)
            .await?;

        let transfer = transfers::insert_transfer(
            &mut tx,
            &NewTransfer {
                company_id,
                transfer_number,
                from_location_id,
                to_location_id: req.to_location_id,
                notes: req.notes.clone(),
                created_by: ctx.user_id,
                idempotency_key: req.idempotency_key.clone(),
                at: now,
            },
        )
        .await?;

        if let Some(key) = key {
            if let Err(e) = idempotency::insert(&mut tx, company_id, key, CREATE_OPERATION, transfer.id, now).await {
                if !e.is_unique_violation() {
                    return Err(e.into());
                }
                tx.rollback().await?;
                return self
                    .replay(company_id, key)
                    .await?
                    .ok_or_else(|| TxnError::Invariant(format!("idempotency key {key} vanished after conflict")));
            }
        }

        for (product_id, quantity) in &requested {
            ensure_available(&mut tx, from_location_id, *product_id, *quantity).await?;
        }

        let mut lines = Vec::with_capacity(req.items.len());
        for item in &req.items {
            lines.push(transfers::insert_line(&mut tx, transfer.id, item.product_id, item.quantity.milli()).await?);
        }

        tx.commit().await?;

        info!(
            company_id,
            transfer_id = transfer.id,
            transfer_number = %transfer.transfer_number,
            from_location_id,
            to_location_id = transfer.to_location_id,
            lines = lines.len(),
            "Stock transfer created"
        );
        Ok(StockTransferDocument { transfer, lines })
    }

    /// PENDING → APPROVED. Moves no stock.
    pub async fn approve_transfer(&self, ctx: &TenantContext, transfer_id: i64) -> TxnResult<StockTransfer> {
        self.transition_only(ctx, transfer_id, TransferAction::Approve).await
    }

    /// PENDING → CANCELLED. Moves no stock.
    pub async fn cancel_transfer(&self, ctx: &TenantContext, transfer_id: i64) -> TxnResult<StockTransfer> {
        self.transition_only(ctx, transfer_id, TransferAction::Cancel).await
    }

    async fn transition_only(
        &self,
        ctx: &TenantContext,
        transfer_id: i64,
        action: TransferAction,
    ) -> TxnResult<StockTransfer> {
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let Some(transfer) =
            transfers::apply_transition(&mut tx, ctx.company_id, transfer_id, action, ctx.user_id, now).await?
        else {
            let refusal = self.refusal(&mut tx, ctx.company_id, transfer_id, action).await;
            tx.rollback().await?;
            return Err(refusal);
        };

        tx.commit().await?;

        info!(
            company_id = ctx.company_id,
            transfer_id,
            %action,
            status = %transfer.status,
            "Stock transfer updated"
        );
        Ok(transfer)
    }

    /// PENDING|APPROVED → COMPLETED: deducts every line from the source and
    /// adds it to the destination in one transaction.
    pub async fn complete_transfer(&self, ctx: &TenantContext, transfer_id: i64) -> TxnResult<StockTransferDocument> {
        let company_id = ctx.company_id;
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let Some(transfer) = transfers::apply_transition(
            &mut tx,
            company_id,
            transfer_id,
            TransferAction::Complete,
            ctx.user_id,
            now,
        )
        .await?
        else {
            let refusal = self.refusal(&mut tx, company_id, transfer_id, TransferAction::Complete).await;
            tx.rollback().await?;
            return Err(refusal);
        };

        let lines = transfers::lines(&mut tx, transfer.id).await?;
        let out = MovementContext {
            cause: MovementCause::TransferOut,
            reference: Some(transfer.transfer_number.as_str()),
            user_id: Some(ctx.user_id),
            at: now,
        };
        let inbound = MovementContext {
            cause: MovementCause::TransferIn,
            ..out
        };
        for line in &lines {
            deduct_checked(&mut tx, transfer.from_location_id, line.product_id, line.quantity(), out).await?;
            adjust_stock(&mut tx, transfer.to_location_id, line.product_id, line.quantity(), inbound).await?;
        }
        let received = transfers::mark_received(&mut tx, transfer.id).await?;
        debug!(transfer_id, received, "Transfer lines received");
        let lines = transfers::lines(&mut tx, transfer.id).await?;

        tx.commit().await?;

        info!(
            company_id,
            transfer_id,
            transfer_number = %transfer.transfer_number,
            from_location_id = transfer.from_location_id,
            to_location_id = transfer.to_location_id,
            lines = lines.len(),
            "Stock transfer completed"
        );
        Ok(StockTransferDocument { transfer, lines })
    }

    /// Header and lines.
    pub async fn get_transfer(&self, ctx: &TenantContext, transfer_id: i64) -> TxnResult<StockTransferDocument> {
        self.db
            .transfers()
            .document(ctx.company_id, transfer_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Stock transfer", transfer_id))
    }

    pub async fn list_transfers(
        &self,
        ctx: &TenantContext,
        status: Option<TransferStatus>,
        limit: u32,
    ) -> TxnResult<Vec<StockTransfer>> {
        Ok(self
            .db
            .transfers()
            .list(ctx.company_id, ctx.location_id, status, limit)
            .await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Explains why a guarded transition matched no row.
    async fn refusal(
        &self,
        conn: &mut sqlx::SqliteConnection,
        company_id: i64,
        transfer_id: i64,
        action: TransferAction,
    ) -> TxnError {
        let current = match transfers::find(conn, company_id, transfer_id).await {
            Ok(current) => current,
            Err(e) => return e.into(),
        };
        let Some(current) = current else {
            return TxnError::not_found("Stock transfer", transfer_id);
        };
        match transition(current.status, action) {
            Err(e) => {
                warn!(company_id, transfer_id, status = %current.status, %action, "Transfer transition refused");
                TxnError::conflict("Stock transfer", transfer_id, e.to_string())
            }
            Ok(_) => TxnError::Invariant(format!(
                "transfer {transfer_id} in {} matched no row for {action}",
                current.status
            )),
        }
    }

    async fn replay(&self, company_id: i64, key: &str) -> TxnResult<Option<StockTransferDocument>> {
        let Some(record) = self.db.idempotency().find(company_id, key).await? else {
            return Ok(None);
        };
        if record.operation != CREATE_OPERATION {
            return Err(TxnError::conflict(
                "Idempotency key",
                key,
                format!("idempotency key was already used for {}", record.operation),
            ));
        }
        let document = self
            .db
            .transfers()
            .document(company_id, record.document_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Stock transfer", record.document_id))?;
        debug!(company_id, idempotency_key = %key, transfer_id = document.transfer.id, "Idempotent replay");
        Ok(Some(document))
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
    use keystone_core::transfer::TransferItemRequest;

    fn units(n: i64) -> Quantity {
        Quantity::from_units(n)
    }

    fn request(fx: &Fixture, items: &[(i64, i64)]) -> CreateStockTransferRequest {
        CreateStockTransferRequest {
            to_location_id: fx.warehouse,
            items: items
                .iter()
                .map(|&(product_id, n)| TransferItemRequest {
                    product_id,
                    quantity: units(n),
                })
                .collect(),
            notes: None,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_create_checks_stock_without_moving_it() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 10).await;
        let transfers = fx.transfers();

        let doc = transfers.create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 10)])).await.unwrap();
        assert_eq!(doc.transfer.status, TransferStatus::Pending);
        assert_eq!(doc.transfer.transfer_number, "ST-000001");
        assert_eq!(doc.total_quantity(), units(10));
        assert_eq!(fx.quantity(fx.shop, fx.widget).await, units(10));
        assert!(fx.quantity(fx.warehouse, fx.widget).await.is_zero());

        let err = transfers
            .create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 6), (fx.widget, 5)]))
            .await
            .unwrap_err();
        assert!(matches!(err, TxnError::InsufficientStock { product_id, .. } if product_id == fx.widget));
        assert_eq!(transfers.list_transfers(&fx.ctx(), None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejections() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 10).await;
        let transfers = fx.transfers();

        let mut same = request(&fx, &[(fx.widget, 1)]);
        same.to_location_id = fx.shop;
        assert_eq!(transfers.create_transfer(&fx.ctx(), &same).await.unwrap_err().kind(), ErrorKind::Validation);

        fx.db.catalog().set_location_active(fx.warehouse, false).await.unwrap();
        let err = transfers.create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 1)])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("invalid locations"));
        fx.db.catalog().set_location_active(fx.warehouse, true).await.unwrap();

        let err = transfers.create_transfer(&fx.ctx(), &request(&fx, &[(9999, 1)])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = transfers.create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 0)])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_complete_conserves_stock() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 10).await;
        fx.set_stock(fx.shop, fx.gadget, 4).await;
        fx.set_stock(fx.warehouse, fx.widget, 1).await;
        let transfers = fx.transfers();

        let doc = transfers
            .create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 7), (fx.gadget, 4)]))
            .await
            .unwrap();
        let done = transfers.complete_transfer(&fx.ctx(), doc.transfer.id).await.unwrap();

        assert_eq!(done.transfer.status, TransferStatus::Completed);
        assert_eq!(done.transfer.approved_by, Some(1));
        assert!(done.transfer.completed_at.is_some());
        assert!(done.lines.iter().all(|l| l.received_quantity() == l.quantity()));

        assert_eq!(fx.quantity(fx.shop, fx.widget).await, units(3));
        assert_eq!(fx.quantity(fx.warehouse, fx.widget).await, units(8));
        assert!(fx.quantity(fx.shop, fx.gadget).await.is_zero());
        assert_eq!(fx.quantity(fx.warehouse, fx.gadget).await, units(4));

        let movements = fx.db.stock().movements(fx.warehouse, fx.widget, 10).await.unwrap();
        assert!(movements
            .iter()
            .any(|m| m.cause == MovementCause::TransferIn && m.reference.as_deref() == Some("ST-000001")));

        let err = transfers.complete_transfer(&fx.ctx(), doc.transfer.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("transfer is not pending"));
        assert_eq!(fx.quantity(fx.warehouse, fx.widget).await, units(8));
    }

    #[tokio::test]
    async fn test_cancelled_transfer_cannot_complete() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 10).await;
        let transfers = fx.transfers();

        let doc = transfers.create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 10)])).await.unwrap();
        let cancelled = transfers.cancel_transfer(&fx.ctx(), doc.transfer.id).await.unwrap();
        assert_eq!(cancelled.status, TransferStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        let err = transfers.complete_transfer(&fx.ctx(), doc.transfer.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = transfers.cancel_transfer(&fx.ctx(), doc.transfer.id).await.unwrap_err();
        assert!(err.to_string().contains("only pending transfers can be cancelled"));

        assert_eq!(fx.quantity(fx.shop, fx.widget).await, units(10));
        assert!(fx.quantity(fx.warehouse, fx.widget).await.is_zero());
    }

    #[tokio::test]
    async fn test_approve_then_complete() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 5).await;
        let transfers = fx.transfers();
        let doc = transfers.create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 5)])).await.unwrap();

        let reviewer = TenantContext::new(fx.company, Some(fx.warehouse), 2);
        let approved = transfers.approve_transfer(&reviewer, doc.transfer.id).await.unwrap();
        assert_eq!(approved.status, TransferStatus::Approved);
        assert_eq!(approved.approved_by, Some(2));

        let err = transfers.approve_transfer(&reviewer, doc.transfer.id).await.unwrap_err();
        assert!(err.to_string().contains("only pending transfers can be approved"));
        assert_eq!(
            transfers.cancel_transfer(&fx.ctx(), doc.transfer.id).await.unwrap_err().kind(),
            ErrorKind::Conflict
        );

        let done = transfers.complete_transfer(&fx.ctx(), doc.transfer.id).await.unwrap();
        assert_eq!(done.transfer.approved_by, Some(2));
        assert_eq!(fx.quantity(fx.warehouse, fx.widget).await, units(5));

        let err = transfers.complete_transfer(&fx.ctx(), 9999).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_complete_rechecks_source_stock() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 5).await;
        let transfers = fx.transfers();
        let doc = transfers.create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 5)])).await.unwrap();

        fx.set_stock(fx.shop, fx.widget, 3).await;
        let err = transfers.complete_transfer(&fx.ctx(), doc.transfer.id).await.unwrap_err();
        assert!(matches!(err, TxnError::InsufficientStock { .. }));

        let still = transfers.get_transfer(&fx.ctx(), doc.transfer.id).await.unwrap();
        assert_eq!(still.transfer.status, TransferStatus::Pending);
        assert_eq!(fx.quantity(fx.shop, fx.widget).await, units(3));
        assert!(fx.quantity(fx.warehouse, fx.widget).await.is_zero());
    }

    #[tokio::test]
    async fn test_idempotent_create() {
        let fx = Fixture::new().await;
        fx.set_stock(fx.shop, fx.widget, 5).await;
        let transfers = fx.transfers();
        let mut req = request(&fx, &[(fx.widget, 2)]);
        req.idempotency_key = Some("move-42".to_string());

        let first = transfers.create_transfer(&fx.ctx(), &req).await.unwrap();
        let second = transfers.create_transfer(&fx.ctx(), &req).await.unwrap();
        assert_eq!(first.transfer.id, second.transfer.id);
        assert_eq!(transfers.list_transfers(&fx.ctx(), None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_completions_move_stock_once() {
        let fx = Fixture::file_backed().await;
        fx.set_stock(fx.shop, fx.widget, 10).await;
        let doc = fx
            .transfers()
            .create_transfer(&fx.ctx(), &request(&fx, &[(fx.widget, 10)]))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..6 {
            let transfers = fx.transfers();
            let ctx = fx.ctx();
            let id = doc.transfer.id;
            handles.push(tokio::spawn(async move { transfers.complete_transfer(&ctx, id).await }));
        }

        let mut completed = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => completed += 1,
                Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict),
            }
        }
        assert_eq!(completed, 1);
        assert!(fx.quantity(fx.shop, fx.widget).await.is_zero());
        assert_eq!(fx.quantity(fx.warehouse, fx.widget).await, units(10));
    }
}
