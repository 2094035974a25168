//! # Sale Coordinator
//!
//! Creates, checks out, holds, voids, edits and deletes sales. Every
//! mutating call is one database transaction.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          create_sale                                    │
//! │                                                                         │
//! │  BEFORE the transaction (reads only, no locks held):                   │
//! │    validate request → idempotency replay? → location, customer         │
//! │    products, tax rates, promotions → totals, paid amount               │
//! │                                                                         │
//! │  ONE transaction:                                                       │
//! │    1. next_number(Sale)            ◄── first statement is a write      │
//! │    2. insert header                                                     │
//! │    3. record idempotency key       ── duplicate? roll back, replay     │
//! │    4. insert lines, deduct stock   ── short? roll back everything      │
//! │    5. record applied promotions (even split)                           │
//! │    6. enqueue ledger_post (+ loyalty_award with a customer)            │
//! │    COMMIT                                                               │
//! │                                                                         │
//! │  AFTER commit: wake the side-effect processor                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sale States
//! ```text
//!   DRAFT/ACTIVE ◄──resume── DRAFT/HOLD
//!        │     ──hold──────►     │
//!        │ checkout              │ checkout
//!        ▼                       ▼
//!   COMPLETED/COMPLETED ────void────► VOID  (+ reversing document)
//!   DRAFT (any)         ────void────► VOID  (+ zero marker document)
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use keystone_core::effects::SideEffectPayload;
use keystone_core::pricing::{self, PricedLine, SaleTotals};
use keystone_core::promotion::{self, PromotionDiscount, PromotionQuery};
use keystone_core::sale::{CreateSaleRequest, UpdateSaleRequest, VoidSaleRequest};
use keystone_core::validation::{validate_create_sale, validate_idempotency_key, validate_update_sale};
use keystone_core::{
    DocumentType, Money, MovementCause, PosStatus, Product, Quantity, Rate, Sale, SaleDocument, SaleStatus,
    ValidationError, MAX_NOTES_LEN,
};
use keystone_db::repository::sale::{self as sales, NewSale, NewSaleLine};
use keystone_db::repository::side_effects;
use keystone_db::repository::idempotency;
use keystone_db::repository::stock::MovementContext;
use keystone_db::Database;

use crate::collaborators::{PromotionEvaluator, SqlPromotionEvaluator, SqlTaxLookup, TaxLookup};
use crate::context::TenantContext;
use crate::effects::SideEffectHandle;
use crate::error::{TxnError, TxnResult};
use crate::numbering::NumberingService;
use crate::stock::{adjust_stock, deduct_checked};

// =============================================================================
// Operation Kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaleKind {
    Checkout,
    Quick,
    Held,
}

impl SaleKind {
    /// Name recorded with the idempotency key.
    fn operation(self) -> &'static str {
        match self {
            SaleKind::Checkout => "create_sale",
            SaleKind::Quick => "create_quick_sale",
            SaleKind::Held => "create_held_sale",
        }
    }

    fn statuses(self) -> (SaleStatus, PosStatus) {
        match self {
            SaleKind::Checkout | SaleKind::Quick => (SaleStatus::Completed, PosStatus::Completed),
            SaleKind::Held => (SaleStatus::Draft, PosStatus::Hold),
        }
    }

    fn moves_stock(self) -> bool {
        self != SaleKind::Held
    }
}

const VOID_OPERATION: &str = "void_sale";

/// Everything computed before the transaction opens.
struct PricedSale {
    lines: Vec<NewSaleLine>,
    totals: SaleTotals,
    promotions: Vec<PromotionDiscount>,
    paid: Money,
}

// =============================================================================
// Coordinator
// =============================================================================

/// Sale lifecycle coordinator.
#[derive(Clone)]
pub struct SaleCoordinator {
    db: Database,
    numbering: NumberingService,
    taxes: Arc<dyn TaxLookup>,
    promotions: Arc<dyn PromotionEvaluator>,
    effects: Option<SideEffectHandle>,
}

impl SaleCoordinator {
    /// Coordinator with the SQL tax and promotion collaborators and no
    /// side-effect processor to wake; queued effects wait for the next poll.
    pub fn new(db: Database, numbering: NumberingService) -> Self {
        SaleCoordinator {
            taxes: Arc::new(SqlTaxLookup::new(db.clone())),
            promotions: Arc::new(SqlPromotionEvaluator::new(db.clone())),
            db,
            numbering,
            effects: None,
        }
    }

    pub fn with_collaborators(mut self, taxes: Arc<dyn TaxLookup>, promotions: Arc<dyn PromotionEvaluator>) -> Self {
        self.taxes = taxes;
        self.promotions = promotions;
        self
    }

    /// Wakes `handle` after every commit that queued side effects.
    pub fn with_effects(mut self, handle: SideEffectHandle) -> Self {
        self.effects = Some(handle);
        self
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Completed, stock-moving checkout.
    pub async fn create_sale(&self, ctx: &TenantContext, req: &CreateSaleRequest) -> TxnResult<SaleDocument> {
        self.create(ctx, req, SaleKind::Checkout).await
    }

    /// Walk-in checkout: no customer, fully paid.
    pub async fn create_quick_sale(&self, ctx: &TenantContext, req: &CreateSaleRequest) -> TxnResult<SaleDocument> {
        let req = CreateSaleRequest {
            customer_id: None,
            paid_amount: None,
            ..req.clone()
        };
        self.create(ctx, &req, SaleKind::Quick).await
    }

    /// Parks a priced cart as DRAFT/HOLD. Consumes a sale number but moves
    /// no stock and queues no side effects.
    pub async fn create_held_sale(&self, ctx: &TenantContext, req: &CreateSaleRequest) -> TxnResult<SaleDocument> {
        self.create(ctx, req, SaleKind::Held).await
    }

    async fn create(&self, ctx: &TenantContext, req: &CreateSaleRequest, kind: SaleKind) -> TxnResult<SaleDocument> {
        validate_create_sale(req)?;
        let company_id = ctx.company_id;
        let location_id = ctx.location()?;
        let key = req.idempotency_key.as_deref();

        if let Some(key) = key {
            if let Some(document) = self.replay(company_id, key, kind.operation()).await? {
                return Ok(document);
            }
        }

        let catalog = self.db.catalog();
        catalog
            .location(company_id, location_id)
            .await?
            .filter(|l| l.is_active)
            .ok_or_else(|| TxnError::not_found("Location", location_id))?;
        if let Some(customer_id) = req.customer_id {
            catalog
                .customer(company_id, customer_id)
                .await?
                .ok_or_else(|| TxnError::not_found("Customer", customer_id))?;
        }
        if let Some(method_id) = req.payment_method_id {
            self.check_payment_method(company_id, method_id).await?;
        }

        let priced = self.price(company_id, req, kind).await?;
        let (status, pos_status) = kind.statuses();
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let sale_number = self
            .numbering
            .next_number_at(&mut tx, &DocumentType::Sale, company_id, Some(location_id), now)
            .await?;

        let sale = sales::insert_sale(
            &mut tx,
            &NewSale {
                company_id,
                location_id,
                sale_number,
                customer_id: req.customer_id,
                created_by: ctx.user_id,
                subtotal_cents: priced.totals.subtotal.cents(),
                tax_cents: priced.totals.tax.cents(),
                discount_cents: priced.totals.discount.cents(),
                total_cents: priced.totals.total.cents(),
                paid_cents: priced.paid.cents(),
                status,
                pos_status,
                is_quick_sale: kind == SaleKind::Quick,
                voids_sale_id: None,
                idempotency_key: req.idempotency_key.clone(),
                notes: req.notes.clone(),
                payment_method_id: req.payment_method_id,
                at: now,
            },
        )
        .await?;

        if let Some(key) = key {
            if let Err(e) = idempotency::insert(&mut tx, company_id, key, kind.operation(), sale.id, now).await {
                if !e.is_unique_violation() {
                    return Err(e.into());
                }
                tx.rollback().await?;
                debug!(company_id, idempotency_key = %key, "Lost idempotency race, replaying winner");
                return self
                    .replay(company_id, key, kind.operation())
                    .await?
                    .ok_or_else(|| TxnError::Invariant(format!("idempotency key {key} vanished after conflict")));
            }
        }

        let movement = MovementContext {
            cause: MovementCause::Sale,
            reference: Some(sale.sale_number.as_str()),
            user_id: Some(ctx.user_id),
            at: now,
        };
        let mut lines = Vec::with_capacity(priced.lines.len());
        for line in &priced.lines {
            lines.push(sales::insert_line(&mut tx, sale.id, line).await?);
            if let (true, Some(product_id)) = (kind.moves_stock(), line.product_id) {
                deduct_checked(&mut tx, location_id, product_id, Quantity::from_milli(line.quantity_milli), movement)
                    .await?;
            }
        }

        let mut promotions = Vec::with_capacity(priced.promotions.len());
        for (promotion_id, amount) in pricing::split_promotion_discount(priced.totals.promotion_discount, &priced.promotions) {
            promotions.push(sales::insert_promotion(&mut tx, sale.id, promotion_id, amount.cents()).await?);
        }

        if kind.moves_stock() {
            enqueue_sale_effects(&mut tx, &sale, ctx.user_id, now).await?;
        }

        tx.commit().await?;

        if kind.moves_stock() {
            self.wake_effects();
        }
        info!(
            company_id,
            location_id,
            sale_id = sale.id,
            sale_number = %sale.sale_number,
            status = %sale.status,
            total = %sale.total(),
            lines = lines.len(),
            promotions = promotions.len(),
            "Sale created"
        );

        Ok(SaleDocument {
            sale,
            lines,
            promotions,
        })
    }

    /// Prices the cart: product lookups, tax rates, promotions, totals.
    async fn price(&self, company_id: i64, req: &CreateSaleRequest, kind: SaleKind) -> TxnResult<PricedSale> {
        let mut product_ids: Vec<i64> = req.items.iter().filter_map(|i| i.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();

        let products: HashMap<i64, Product> = self
            .db
            .catalog()
            .products_by_ids(company_id, &product_ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut rates: HashMap<i64, Rate> = HashMap::new();
        let mut priced_lines: Vec<PricedLine> = Vec::with_capacity(req.items.len());
        let mut lines = Vec::with_capacity(req.items.len());

        for (index, item) in req.items.iter().enumerate() {
            let product = match item.product_id {
                Some(id) => {
                    let product = products.get(&id).ok_or_else(|| TxnError::not_found("Product", id))?;
                    if !product.is_active {
                        return Err(ValidationError::invalid(format!("items[{index}].product_id"), "product is inactive").into());
                    }
                    Some(product)
                }
                None => None,
            };

            let tax_id = item.tax_id.or_else(|| product.and_then(|p| p.tax_id));
            let rate = match tax_id {
                Some(id) => match rates.get(&id) {
                    Some(rate) => *rate,
                    None => {
                        let rate = self.taxes.rate(company_id, id).await?;
                        rates.insert(id, rate);
                        rate
                    }
                },
                None => Rate::zero(),
            };

            let priced = pricing::price_line(item.quantity, item.unit_price, item.discount, rate)?;
            lines.push(NewSaleLine {
                product_id: item.product_id,
                description: item.description.clone().or_else(|| product.map(|p| p.name.clone())),
                quantity_milli: item.quantity.milli(),
                unit_price_cents: item.unit_price.cents(),
                discount_bps: i64::from(item.discount.bps()),
                discount_cents: priced.discount.cents(),
                tax_id,
                tax_cents: priced.tax.cents(),
                line_total_cents: priced.line_total.cents(),
                serial_numbers: (!item.serial_numbers.is_empty()).then(|| item.serial_numbers.join(",")),
            });
            priced_lines.push(priced);
        }

        let matched = match req.customer_id {
            Some(customer_id) => {
                let mut category_ids: Vec<i64> = products.values().filter_map(|p| p.category_id).collect();
                category_ids.sort_unstable();
                category_ids.dedup();
                let query = PromotionQuery {
                    customer_id,
                    subtotal: pricing::provisional_subtotal(&priced_lines)?,
                    product_ids,
                    category_ids,
                };
                self.promotions.evaluate(company_id, &query).await?
            }
            None => Vec::new(),
        };

        let totals = pricing::sale_totals(&priced_lines, req.discount, promotion::total_discount(&matched))?;
        let paid = match kind {
            SaleKind::Held => Money::zero(),
            SaleKind::Checkout | SaleKind::Quick => pricing::resolve_paid(req.paid_amount, totals.total)?,
        };

        Ok(PricedSale {
            lines,
            totals,
            promotions: matched,
            paid,
        })
    }

    // =========================================================================
    // Draft Sales
    // =========================================================================

    /// DRAFT (held or active) → COMPLETED: deducts stock for every product
    /// line and queues the side effects. `paid` defaults to the total.
    pub async fn checkout_held_sale(
        &self,
        ctx: &TenantContext,
        sale_id: i64,
        paid: Option<Money>,
    ) -> TxnResult<SaleDocument> {
        let company_id = ctx.company_id;
        let draft = self
            .db
            .sales()
            .get(company_id, sale_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Sale", sale_id))?;
        if draft.status != SaleStatus::Draft {
            return Err(TxnError::conflict("Sale", sale_id, "only draft sales can be checked out"));
        }
        let paid = pricing::resolve_paid(paid, draft.total())?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;

        let Some(sale) = sales::complete_draft(&mut tx, company_id, sale_id, paid.cents(), now).await? else {
            tx.rollback().await?;
            return Err(self.refusal(company_id, sale_id, "only draft sales can be checked out").await);
        };

        let lines = sales::lines(&mut tx, sale.id).await?;
        let movement = MovementContext {
            cause: MovementCause::Sale,
            reference: Some(sale.sale_number.as_str()),
            user_id: Some(ctx.user_id),
            at: now,
        };
        for line in &lines {
            if let Some(product_id) = line.product_id {
                deduct_checked(&mut tx, sale.location_id, product_id, line.quantity(), movement).await?;
            }
        }
        enqueue_sale_effects(&mut tx, &sale, ctx.user_id, now).await?;
        let promotions = sales::promotions(&mut tx, sale.id).await?;

        tx.commit().await?;

        self.wake_effects();
        info!(
            company_id,
            sale_id,
            sale_number = %sale.sale_number,
            total = %sale.total(),
            paid = %sale.paid(),
            "Held sale checked out"
        );
        Ok(SaleDocument {
            sale,
            lines,
            promotions,
        })
    }

    /// DRAFT/ACTIVE → DRAFT/HOLD.
    pub async fn hold_sale(&self, ctx: &TenantContext, sale_id: i64) -> TxnResult<Sale> {
        self.flip_pos_status(ctx, sale_id, PosStatus::Active, PosStatus::Hold, "only active draft sales can be held")
            .await
    }

    /// DRAFT/HOLD → DRAFT/ACTIVE.
    pub async fn resume_sale(&self, ctx: &TenantContext, sale_id: i64) -> TxnResult<Sale> {
        self.flip_pos_status(ctx, sale_id, PosStatus::Hold, PosStatus::Active, "only held sales can be resumed")
            .await
    }

    async fn flip_pos_status(
        &self,
        ctx: &TenantContext,
        sale_id: i64,
        from: PosStatus,
        to: PosStatus,
        refusal: &str,
    ) -> TxnResult<Sale> {
        match self.db.sales().set_pos_status(ctx.company_id, sale_id, from, to).await? {
            Some(sale) => {
                info!(company_id = ctx.company_id, sale_id, pos_status = %to, "Sale POS status changed");
                Ok(sale)
            }
            None => Err(self.refusal(ctx.company_id, sale_id, refusal).await),
        }
    }

    /// Soft-deletes a DRAFT sale. Completed and void sales stay on record.
    pub async fn delete_sale(&self, ctx: &TenantContext, sale_id: i64) -> TxnResult<()> {
        let repo = self.db.sales();
        let sale = repo
            .get(ctx.company_id, sale_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Sale", sale_id))?;
        let reason = match sale.status {
            SaleStatus::Draft => None,
            SaleStatus::Completed => Some("completed sales cannot be deleted"),
            SaleStatus::Void => Some("void sales cannot be deleted"),
        };
        if let Some(reason) = reason {
            return Err(TxnError::conflict("Sale", sale_id, reason));
        }
        if !repo.soft_delete(ctx.company_id, sale_id).await? {
            return Err(self.refusal(ctx.company_id, sale_id, "only draft sales can be deleted").await);
        }
        info!(company_id = ctx.company_id, sale_id, "Sale deleted");
        Ok(())
    }

    // =========================================================================
    // Header Edits
    // =========================================================================

    /// Sets notes and/or the payment method on a sale in any status.
    /// Amounts, lines and status cannot be changed this way.
    pub async fn update_sale(&self, ctx: &TenantContext, sale_id: i64, req: &UpdateSaleRequest) -> TxnResult<Sale> {
        validate_update_sale(req)?;
        if let Some(method_id) = req.payment_method_id {
            self.check_payment_method(ctx.company_id, method_id).await?;
        }

        let sale = self
            .db
            .sales()
            .update_details(ctx.company_id, sale_id, req.notes.as_deref(), req.payment_method_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Sale", sale_id))?;
        info!(
            company_id = ctx.company_id,
            sale_id,
            payment_method_id = ?sale.payment_method_id,
            "Sale details updated"
        );
        Ok(sale)
    }

    // =========================================================================
    // Void
    // =========================================================================

    /// Marks the sale VOID and issues the void document under the next sale
    /// number. A COMPLETED original gets negated lines, restocked products
    /// and a reversing ledger post; a DRAFT original gets a zero marker.
    pub async fn void_sale(&self, ctx: &TenantContext, sale_id: i64, req: &VoidSaleRequest) -> TxnResult<SaleDocument> {
        let company_id = ctx.company_id;
        validate_idempotency_key(req.idempotency_key.as_deref())?;
        let reason = req.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
        if reason.is_some_and(|r| r.len() > MAX_NOTES_LEN) {
            return Err(ValidationError::TooLong {
                field: "reason".to_string(),
                max: MAX_NOTES_LEN,
            }
            .into());
        }

        let key = req.idempotency_key.as_deref();
        if let Some(key) = key {
            if let Some(document) = self.replay(company_id, key, VOID_OPERATION).await? {
                return Ok(document);
            }
        }

        let original = self
            .db
            .sales()
            .get(company_id, sale_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Sale", sale_id))?;
        if original.status == SaleStatus::Void {
            return self.replay_void_or_refuse(company_id, sale_id, key).await;
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let void_number = self
            .numbering
            .next_number_at(&mut tx, &DocumentType::Sale, company_id, Some(original.location_id), now)
            .await?;

        let current = sales::find(&mut tx, company_id, sale_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Sale", sale_id))?;
        if current.status == SaleStatus::Void || !sales::mark_void(&mut tx, company_id, sale_id, current.status, now).await? {
            tx.rollback().await?;
            return self.replay_void_or_refuse(company_id, sale_id, key).await;
        }

        let reversing = current.status == SaleStatus::Completed;
        let sign = if reversing { -1 } else { 0 };
        let void = sales::insert_sale(
            &mut tx,
            &NewSale {
                company_id,
                location_id: current.location_id,
                sale_number: void_number,
                customer_id: current.customer_id,
                created_by: ctx.user_id,
                subtotal_cents: sign * current.subtotal_cents,
                tax_cents: sign * current.tax_cents,
                discount_cents: sign * current.discount_cents,
                total_cents: sign * current.total_cents,
                paid_cents: sign * current.paid_cents,
                status: SaleStatus::Void,
                pos_status: PosStatus::Completed,
                is_quick_sale: current.is_quick_sale,
                voids_sale_id: Some(sale_id),
                idempotency_key: req.idempotency_key.clone(),
                notes: reason.map(str::to_string),
                payment_method_id: current.payment_method_id,
                at: now,
            },
        )
        .await?;

        if let Some(key) = key {
            if let Err(e) = idempotency::insert(&mut tx, company_id, key, VOID_OPERATION, void.id, now).await {
                if !e.is_unique_violation() {
                    return Err(e.into());
                }
                tx.rollback().await?;
                return self
                    .replay(company_id, key, VOID_OPERATION)
                    .await?
                    .ok_or_else(|| TxnError::Invariant(format!("idempotency key {key} vanished after conflict")));
            }
        }

        let mut lines = Vec::new();
        if reversing {
            let movement = MovementContext {
                cause: MovementCause::SaleVoid,
                reference: Some(void.sale_number.as_str()),
                user_id: Some(ctx.user_id),
                at: now,
            };
            for line in sales::lines(&mut tx, sale_id).await? {
                lines.push(sales::insert_line(&mut tx, void.id, &NewSaleLine::mirror_of(&line)).await?);
                if let Some(product_id) = line.product_id {
                    adjust_stock(&mut tx, current.location_id, product_id, line.quantity(), movement).await?;
                }
            }
            side_effects::enqueue(
                &mut tx,
                &SideEffectPayload::LedgerPost {
                    company_id,
                    reference: void.sale_number.clone(),
                    amount: -current.total(),
                    user_id: ctx.user_id,
                },
                now,
            )
            .await?;
        }

        tx.commit().await?;

        if reversing {
            self.wake_effects();
        }
        info!(
            company_id,
            sale_id,
            void_sale_id = void.id,
            void_number = %void.sale_number,
            reversed = reversing,
            "Sale voided"
        );
        Ok(SaleDocument {
            sale: void,
            lines,
            promotions: Vec::new(),
        })
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Header, lines and applied promotions.
    pub async fn get_sale(&self, ctx: &TenantContext, sale_id: i64) -> TxnResult<SaleDocument> {
        self.db
            .sales()
            .document(ctx.company_id, sale_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Sale", sale_id))
    }

    pub async fn list_sales(&self, ctx: &TenantContext, status: Option<SaleStatus>, limit: u32) -> TxnResult<Vec<Sale>> {
        Ok(self.db.sales().list(ctx.company_id, status, limit).await?)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Document previously recorded under `key`, if any.
    async fn replay(&self, company_id: i64, key: &str, operation: &str) -> TxnResult<Option<SaleDocument>> {
        let Some(record) = self.db.idempotency().find(company_id, key).await? else {
            return Ok(None);
        };
        if record.operation != operation {
            warn!(company_id, idempotency_key = %key, recorded = %record.operation, operation, "Idempotency key reused");
            return Err(TxnError::conflict(
                "Idempotency key",
                key,
                format!("idempotency key was already used for {}", record.operation),
            ));
        }

        let document = self
            .db
            .sales()
            .document(company_id, record.document_id)
            .await?
            .ok_or_else(|| TxnError::not_found("Sale", record.document_id))?;
        debug!(company_id, idempotency_key = %key, sale_id = document.sale.id, "Idempotent replay");
        Ok(Some(document))
    }

    async fn check_payment_method(&self, company_id: i64, method_id: i64) -> TxnResult<()> {
        self.db
            .catalog()
            .payment_method(company_id, method_id)
            .await?
            .ok_or_else(|| TxnError::not_found("PaymentMethod", method_id))?;
        Ok(())
    }

    /// A void that lost the race to a call with the same key replays the
    /// winner; anything else is a second void.
    async fn replay_void_or_refuse(&self, company_id: i64, sale_id: i64, key: Option<&str>) -> TxnResult<SaleDocument> {
        if let Some(key) = key {
            if let Some(document) = self.replay(company_id, key, VOID_OPERATION).await? {
                return Ok(document);
            }
        }
        warn!(company_id, sale_id, "Refusing to void a void sale");
        Err(TxnError::conflict("Sale", sale_id, "sale is already void"))
    }

    /// NotFound if the sale is gone, otherwise a Conflict carrying `reason`.
    async fn refusal(&self, company_id: i64, sale_id: i64, reason: &str) -> TxnError {
        match self.db.sales().get(company_id, sale_id).await {
            Ok(Some(sale)) => {
                warn!(company_id, sale_id, status = %sale.status, pos_status = %sale.pos_status, reason, "Sale change refused");
                TxnError::conflict("Sale", sale_id, reason)
            }
            Ok(None) => TxnError::not_found("Sale", sale_id),
            Err(e) => e.into(),
        }
    }

    fn wake_effects(&self) {
        if let Some(handle) = &self.effects {
            handle.notify();
        }
    }
}

/// Queues the ledger post and, with a customer, the loyalty award.
async fn enqueue_sale_effects(
    conn: &mut SqliteConnection,
    sale: &Sale,
    user_id: i64,
    at: DateTime<Utc>,
) -> TxnResult<()> {
    side_effects::enqueue(
        conn,
        &SideEffectPayload::LedgerPost {
            company_id: sale.company_id,
            reference: sale.sale_number.clone(),
            amount: sale.total(),
            user_id,
        },
        at,
    )
    .await?;

    if let Some(customer_id) = sale.customer_id {
        side_effects::enqueue(
            conn,
            &SideEffectPayload::LoyaltyAward {
                company_id: sale.company_id,
                customer_id,
                sale_id: sale.id,
                sale_number: sale.sale_number.clone(),
                amount: sale.total(),
            },
            at,
        )
        .await?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
