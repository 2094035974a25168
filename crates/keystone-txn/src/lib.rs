//! # keystone-txn: Transactional Core for Keystone
//!
//! Numbering, stock, sale and transfer operations for a multi-tenant ERP,
//! each executed as exactly one SQLite transaction, plus the worker that
//! applies post-commit side effects.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Keystone Transaction Core                          │
//! │                                                                         │
//! │  TenantContext (company, location, user) from the caller               │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ SaleCoordinator  │   │ TransferCoord.   │   │ StockLedger      │    │
//! │  │ create / quick / │   │ create / approve │   │ adjust           │    │
//! │  │ held / checkout  │   │ complete/cancel  │   │                  │    │
//! │  │ hold / resume    │   │                  │   │                  │    │
//! │  │ void / delete    │   │                  │   │                  │    │
//! │  └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘    │
//! │           │   same transaction   │                      │              │
//! │           ▼                      ▼                      ▼              │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ NumberingService.next_number   stock::deduct_checked / adjust   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │           │ enqueue (in tx)                                             │
//! │           ▼                                                             │
//! │  side_effects table ──► SideEffectProcessor ──► LedgerPoster           │
//! │                          retry + dead letter  └► LoyaltyAwarder        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`collaborators`] - Tax, promotion, ledger and loyalty traits + SQL impls
//! - [`config`] - TOML + environment configuration
//! - [`context`] - Tenant context supplied by the caller
//! - [`effects`] - Side-effect processor and its handle
//! - [`error`] - `TxnError` and the closed `ErrorKind` set
//! - [`numbering`] - Document numbers inside the caller's transaction
//! - [`sale`] - Sale lifecycle
//! - [`service`] - `Keystone` bundle wiring everything to one database
//! - [`stock`] - Check-then-deduct primitives and manual adjustments
//! - [`transfer`] - Two-phase stock transfers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use keystone_txn::{Keystone, KeystoneConfig, TenantContext};
//!
//! let config = KeystoneConfig::load_or_default(None);
//! let (keystone, processor) = Keystone::open(&config).await?;
//! tokio::spawn(processor.run());
//!
//! let ctx = TenantContext::new(company_id, Some(location_id), user_id);
//! let sale = keystone.sales.create_sale(&ctx, &request).await?;
//! println!("Issued {}", sale.sale.sale_number);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod collaborators;
pub mod config;
pub mod context;
pub mod effects;
pub mod error;
pub mod numbering;
pub mod sale;
pub mod service;
pub mod stock;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use collaborators::{LedgerPoster, LoyaltyAwarder, PromotionEvaluator, TaxLookup};
pub use config::KeystoneConfig;
pub use context::TenantContext;
pub use effects::{DrainReport, SideEffectHandle, SideEffectProcessor};
pub use error::{ConfigError, ErrorKind, TxnError, TxnResult};
pub use numbering::NumberingService;
pub use sale::SaleCoordinator;
pub use service::Keystone;
pub use stock::{AdjustmentOutcome, StockLedger};
pub use transfer::TransferCoordinator;
