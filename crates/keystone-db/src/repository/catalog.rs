//! # Catalog Repository
//!
//! Tenant reference data: companies, locations, customers, categories,
//! taxes, payment methods, products and promotions.
//!
//! Coordinators only read from here, and only before they open their
//! transaction. The insert methods back the seed binary and tests.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use keystone_core::promotion::{ApplicableTo, DiscountType, Promotion};
use keystone_core::{Category, Company, Customer, Location, PaymentMethod, Product, Tax};

/// Input for [`CatalogRepository::insert_product`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub company_id: i64,
    pub category_id: Option<i64>,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub tax_id: Option<i64>,
}

/// Input for [`CatalogRepository::insert_promotion`].
#[derive(Debug, Clone)]
pub struct NewPromotion {
    pub company_id: i64,
    pub name: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub min_amount_cents: Option<i64>,
    pub applicable_to: ApplicableTo,
    pub product_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

/// Repository for tenant reference data.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn company(&self, id: i64) -> DbResult<Option<Company>> {
        let company = sqlx::query_as::<_, Company>("SELECT id, name, is_active FROM companies WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(company)
    }

    /// Location `id` if it belongs to `company_id`.
    pub async fn location(&self, company_id: i64, id: i64) -> DbResult<Option<Location>> {
        let location = sqlx::query_as::<_, Location>(
            "SELECT id, company_id, name, is_active FROM locations WHERE id = ?1 AND company_id = ?2",
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(location)
    }

    /// Customer `id` if it belongs to `company_id` and is not deleted.
    pub async fn customer(&self, company_id: i64, id: i64) -> DbResult<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, company_id, name, is_deleted
            FROM customers
            WHERE id = ?1 AND company_id = ?2 AND is_deleted = 0
            "#,
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(customer)
    }

    /// Products of `company_id` among `ids`. Missing or foreign ids are
    /// simply absent from the result.
    pub async fn products_by_ids(&self, company_id: i64, ids: &[i64]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, company_id, category_id, sku, name, price_cents, tax_id, is_active \
             FROM products WHERE company_id = ",
        );
        qb.push_bind(company_id);
        qb.push(" AND id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let products = qb.build_query_as::<Product>().fetch_all(&self.pool).await?;
        debug!(company_id, requested = ids.len(), found = products.len(), "Loaded products");
        Ok(products)
    }

    /// Active tax `id` of `company_id`.
    pub async fn tax(&self, company_id: i64, id: i64) -> DbResult<Option<Tax>> {
        let tax = sqlx::query_as::<_, Tax>(
            r#"
            SELECT id, company_id, name, rate_bps, is_active
            FROM taxes
            WHERE id = ?1 AND company_id = ?2 AND is_active = 1
            "#,
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tax)
    }

    /// Active payment method `id` of `company_id`.
    pub async fn payment_method(&self, company_id: i64, id: i64) -> DbResult<Option<PaymentMethod>> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            r#"
            SELECT id, company_id, name, is_active
            FROM payment_methods
            WHERE id = ?1 AND company_id = ?2 AND is_active = 1
            "#,
        )
        .bind(id)
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(method)
    }

    /// Promotions flagged active; date windows are checked by the caller.
    pub async fn active_promotions(&self, company_id: i64) -> DbResult<Vec<Promotion>> {
        let promotions = sqlx::query_as::<_, Promotion>(
            r#"
            SELECT id, company_id, name, discount_type, value, min_amount_cents,
                   applicable_to, product_ids, category_ids, start_date, end_date, is_active
            FROM promotions
            WHERE company_id = ?1 AND is_active = 1
            ORDER BY id
            "#,
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(promotions)
    }

    // =========================================================================
    // Inserts
    // =========================================================================

    pub async fn insert_company(&self, name: &str) -> DbResult<Company> {
        let company = sqlx::query_as::<_, Company>(
            "INSERT INTO companies (name) VALUES (?1) RETURNING id, name, is_active",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        debug!(company_id = company.id, "Inserted company");
        Ok(company)
    }

    pub async fn insert_location(&self, company_id: i64, name: &str) -> DbResult<Location> {
        let location = sqlx::query_as::<_, Location>(
            "INSERT INTO locations (company_id, name) VALUES (?1, ?2) \
             RETURNING id, company_id, name, is_active",
        )
        .bind(company_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(location)
    }

    pub async fn set_location_active(&self, id: i64, active: bool) -> DbResult<()> {
        sqlx::query("UPDATE locations SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_company_active(&self, id: i64, active: bool) -> DbResult<()> {
        sqlx::query("UPDATE companies SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_customer(&self, company_id: i64, name: &str) -> DbResult<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            "INSERT INTO customers (company_id, name) VALUES (?1, ?2) \
             RETURNING id, company_id, name, is_deleted",
        )
        .bind(company_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(customer)
    }

    pub async fn insert_category(&self, company_id: i64, name: &str) -> DbResult<Category> {
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (company_id, name) VALUES (?1, ?2) \
             RETURNING id, company_id, name",
        )
        .bind(company_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    pub async fn insert_tax(&self, company_id: i64, name: &str, rate_bps: i64) -> DbResult<Tax> {
        let tax = sqlx::query_as::<_, Tax>(
            "INSERT INTO taxes (company_id, name, rate_bps) VALUES (?1, ?2, ?3) \
             RETURNING id, company_id, name, rate_bps, is_active",
        )
        .bind(company_id)
        .bind(name)
        .bind(rate_bps)
        .fetch_one(&self.pool)
        .await?;
        Ok(tax)
    }

    pub async fn insert_payment_method(&self, company_id: i64, name: &str) -> DbResult<PaymentMethod> {
        let method = sqlx::query_as::<_, PaymentMethod>(
            "INSERT INTO payment_methods (company_id, name) VALUES (?1, ?2) \
             RETURNING id, company_id, name, is_active",
        )
        .bind(company_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(method)
    }

    pub async fn set_payment_method_active(&self, id: i64, active: bool) -> DbResult<()> {
        sqlx::query("UPDATE payment_methods SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_product(&self, product: &NewProduct) -> DbResult<Product> {
        let inserted = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (company_id, category_id, sku, name, price_cents, tax_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, company_id, category_id, sku, name, price_cents, tax_id, is_active
            "#,
        )
        .bind(product.company_id)
        .bind(product.category_id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.tax_id)
        .fetch_one(&self.pool)
        .await?;
        debug!(product_id = inserted.id, sku = %inserted.sku, "Inserted product");
        Ok(inserted)
    }

    pub async fn insert_promotion(&self, promotion: &NewPromotion) -> DbResult<Promotion> {
        let product_ids = serde_json::to_string(&promotion.product_ids)?;
        let category_ids = serde_json::to_string(&promotion.category_ids)?;

        let inserted = sqlx::query_as::<_, Promotion>(
            r#"
            INSERT INTO promotions (
                company_id, name, discount_type, value, min_amount_cents,
                applicable_to, product_ids, category_ids
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING id, company_id, name, discount_type, value, min_amount_cents,
                      applicable_to, product_ids, category_ids, start_date, end_date, is_active
            "#,
        )
        .bind(promotion.company_id)
        .bind(&promotion.name)
        .bind(promotion.discount_type)
        .bind(promotion.value)
        .bind(promotion.min_amount_cents)
        .bind(promotion.applicable_to)
        .bind(product_ids)
        .bind(category_ids)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
