//! Shared test fixture: one company with two locations, a customer, an 8%
//! tax, a cash payment method and three products.

use chrono::Utc;
use std::time::Duration;
use tempfile::TempDir;

use keystone_core::promotion::{ApplicableTo, DiscountType};
use keystone_core::{MovementCause, PosStatus, Quantity, SaleStatus};
use keystone_db::repository::catalog::{NewProduct, NewPromotion};
use keystone_db::repository::sale::{self as sales, NewSale};
use keystone_db::repository::stock::{self, MovementContext};
use keystone_db::{Database, DbConfig};

use crate::context::TenantContext;
use crate::numbering::NumberingService;
use crate::sale::SaleCoordinator;
use crate::stock::StockLedger;
use crate::transfer::TransferCoordinator;

pub(crate) struct Fixture {
    pub db: Database,
    pub company: i64,
    pub shop: i64,
    pub warehouse: i64,
    pub customer: i64,
    /// 8%.
    pub tax: i64,
    pub cash: i64,
    /// $10.00, untaxed.
    pub widget: i64,
    /// $5.00, untaxed.
    pub gadget: i64,
    /// $20.00, carries `tax` as its default.
    pub taxed: i64,
    _dir: Option<TempDir>,
}

impl Fixture {
    /// In-memory database with a single connection.
    pub async fn new() -> Self {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        Self::seed(db, None).await
    }

    /// File-backed database with a real pool, for tests that race writers.
    pub async fn file_backed() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig::new(dir.path().join("keystone.db"))
            .max_connections(8)
            .busy_timeout(Duration::from_secs(30));
        let db = Database::new(config).await.unwrap();
        Self::seed(db, Some(dir)).await
    }

    async fn seed(db: Database, dir: Option<TempDir>) -> Self {
        let catalog = db.catalog();
        let company = catalog.insert_company("Acme Retail").await.unwrap().id;
        let shop = catalog.insert_location(company, "Main Street").await.unwrap().id;
        let warehouse = catalog.insert_location(company, "Warehouse").await.unwrap().id;
        let customer = catalog.insert_customer(company, "Jordan Lee").await.unwrap().id;
        let tax = catalog.insert_tax(company, "VAT 8%", 800).await.unwrap().id;
        let cash = catalog.insert_payment_method(company, "Cash").await.unwrap().id;
        let hardware = catalog.insert_category(company, "Hardware").await.unwrap().id;

        let product = |sku: &str, name: &str, price_cents: i64, tax_id: Option<i64>| NewProduct {
            company_id: company,
            category_id: Some(hardware),
            sku: sku.to_string(),
            name: name.to_string(),
            price_cents,
            tax_id,
        };
        let widget = catalog.insert_product(&product("W-1", "Widget", 1000, None)).await.unwrap().id;
        let gadget = catalog.insert_product(&product("G-1", "Gadget", 500, None)).await.unwrap().id;
        let taxed = catalog
            .insert_product(&product("T-1", "Taxed Tool", 2000, Some(tax)))
            .await
            .unwrap()
            .id;

        Fixture {
            db,
            company,
            shop,
            warehouse,
            customer,
            tax,
            cash,
            widget,
            gadget,
            taxed,
            _dir: dir,
        }
    }

    /// User 1 at the shop.
    pub fn ctx(&self) -> TenantContext {
        TenantContext::new(self.company, Some(self.shop), 1)
    }

    pub fn numbering(&self) -> NumberingService {
        NumberingService::new(self.db.clone(), true)
    }

    pub fn sales(&self) -> SaleCoordinator {
        SaleCoordinator::new(self.db.clone(), self.numbering())
    }

    pub fn transfers(&self) -> TransferCoordinator {
        TransferCoordinator::new(self.db.clone(), self.numbering())
    }

    pub fn stock_ledger(&self) -> StockLedger {
        StockLedger::new(self.db.clone(), self.numbering())
    }

    /// Sets the on-hand quantity to exactly `units`.
    pub async fn set_stock(&self, location_id: i64, product_id: i64, units: i64) {
        let delta = Quantity::from_units(units) - self.quantity(location_id, product_id).await;
        if delta.is_zero() {
            return;
        }
        let mut tx = self.db.begin().await.unwrap();
        stock::adjust(
            &mut tx,
            location_id,
            product_id,
            delta,
            MovementContext {
                cause: MovementCause::Adjustment,
                reference: Some("TEST"),
                user_id: None,
                at: Utc::now(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn quantity(&self, location_id: i64, product_id: i64) -> Quantity {
        self.db.stock().quantity(location_id, product_id).await.unwrap()
    }

    /// Inserts a bare COMPLETED sale for the customer and returns its id.
    pub async fn completed_sale_for_customer(&self, total_cents: i64) -> i64 {
        let mut tx = self.db.begin().await.unwrap();
        let sale = sales::insert_sale(
            &mut tx,
            &NewSale {
                company_id: self.company,
                location_id: self.shop,
                sale_number: format!("FIXTURE-{total_cents}"),
                customer_id: Some(self.customer),
                created_by: 1,
                subtotal_cents: total_cents,
                tax_cents: 0,
                discount_cents: 0,
                total_cents,
                paid_cents: total_cents,
                status: SaleStatus::Completed,
                pos_status: PosStatus::Completed,
                is_quick_sale: false,
                voids_sale_id: None,
                idempotency_key: None,
                notes: None,
                payment_method_id: None,
                at: Utc::now(),
            },
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();
        sale.id
    }

    /// Company-wide percentage promotion; returns its id.
    pub async fn percentage_promotion(&self, name: &str, percent: i64) -> i64 {
        self.promotion(name, DiscountType::Percentage, percent * 100).await
    }

    /// Company-wide fixed-amount promotion; returns its id.
    pub async fn fixed_promotion(&self, name: &str, cents: i64) -> i64 {
        self.promotion(name, DiscountType::Fixed, cents).await
    }

    async fn promotion(&self, name: &str, discount_type: DiscountType, value: i64) -> i64 {
        self.db
            .catalog()
            .insert_promotion(&NewPromotion {
                company_id: self.company,
                name: name.to_string(),
                discount_type,
                value,
                min_amount_cents: None,
                applicable_to: ApplicableTo::All,
                product_ids: Vec::new(),
                category_ids: Vec::new(),
            })
            .await
            .unwrap()
            .id
    }
}
