//! # Database Migrations
//!
//! Embedded SQL migrations for Keystone.
//!
//! ## Schema Files
//! ```text
//! migrations/sqlite/
//! ├── 001_tenancy_and_catalog.sql    companies, locations, customers,
//! │                                  categories, taxes, products, promotions
//! ├── 002_numbering_and_stock.sql    numbering_sequences, stock,
//! │                                  stock_movements, stock_adjustments
//! ├── 003_sales.sql                  sales, sale_details, sale_promotions
//! ├── 004_stock_transfers.sql        stock_transfers, stock_transfer_details
//! └── 005_ledger_loyalty_outbox.sql  ledger_entries, loyalty_*, side_effects,
//!                                    idempotency_keys
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Write idempotent SQL (use `IF NOT EXISTS` where possible)
//! 3. **NEVER** modify existing migrations - always add new ones

use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

/// Embedded migrations from the workspace `migrations/sqlite` directory.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Each migration runs in its own transaction, in filename order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(total_migrations, applied_migrations)` for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((total, applied as usize))
}
