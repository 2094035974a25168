//! # keystone-db: Database Layer for Keystone
//!
//! Storage for the Keystone transactional core. SQLite through sqlx, with
//! embedded migrations and one repository module per table family.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Keystone Data Flow                               │
//! │                                                                         │
//! │  keystone-txn coordinator (SaleCoordinator::create_sale)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   keystone-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ (sale.rs ...) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ free fns on   │    │ 001_tenancy  │  │   │
//! │  │   │ begin() → tx  │◄───│ &mut conn     │    │ 002_stock    │  │   │
//! │  │   │ accessors     │    │ + pool repos  │    │ ...          │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (numbering, stock, sale, etc.)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keystone_db::{Database, DbConfig};
//! use keystone_db::repository::{numbering, stock};
//!
//! let db = Database::new(DbConfig::new("keystone.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let seq = numbering::increment(&mut tx, company_id, Some(location_id), "sale", now).await?;
//! stock::adjust(&mut tx, location_id, product_id, delta, ctx).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::catalog::CatalogRepository;
pub use repository::idempotency::IdempotencyRepository;
pub use repository::ledger::LedgerRepository;
pub use repository::loyalty::LoyaltyRepository;
pub use repository::numbering::NumberingRepository;
pub use repository::sale::SaleRepository;
pub use repository::side_effects::SideEffectRepository;
pub use repository::stock::StockRepository;
pub use repository::transfer::TransferRepository;

/// Transaction handle returned by [`Database::begin`].
pub type DbTransaction = sqlx::Transaction<'static, sqlx::Sqlite>;
