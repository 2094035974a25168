//! # keystone-core: Pure Business Logic for Keystone
//!
//! Money and quantity arithmetic, sale pricing, promotion eligibility,
//! document numbering formats and the stock transfer state machine. Nothing
//! in this crate touches a database, a clock or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Keystone Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              keystone-txn (coordinators, worker)                │   │
//! │  │   NumberingService  StockLedger  SaleCoordinator  Transfer...  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ keystone-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────────────┐  │   │
//! │  │   │  money   │ │ pricing  │ │promotion │ │ transfer (FSM)   │  │   │
//! │  │   │ quantity │ │  totals  │ │  rules   │ │ numbering format │  │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 keystone-db (Database Layer)                    │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` (cents) and `Rate` (basis points)
//! - [`quantity`] - `Quantity` in thousandths of a unit
//! - [`pricing`] - Line and header math for sales
//! - [`promotion`] - Promotion eligibility
//! - [`numbering`] - Document types and number formats
//! - [`transfer`] - Transfer state machine and rows
//! - [`sale`] - Sale rows and requests
//! - [`effects`] - Side-effect queue payloads
//! - [`types`] - Catalog, stock, ledger and loyalty rows
//! - [`validation`] - Request shape checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use keystone_core::money::{Money, Rate};
//! use keystone_core::pricing::{price_line, sale_totals};
//! use keystone_core::quantity::Quantity;
//!
//! let lines = [
//!     price_line(Quantity::from_units(2), Money::from_cents(1000), Rate::from_percent(10), Rate::zero()).unwrap(),
//!     price_line(Quantity::from_units(1), Money::from_cents(500), Rate::zero(), Rate::zero()).unwrap(),
//! ];
//! let totals = sale_totals(&lines, Money::zero(), Money::zero()).unwrap();
//! assert_eq!(totals.total.cents(), 2300);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod effects;
pub mod error;
pub mod money;
pub mod numbering;
pub mod pricing;
pub mod promotion;
pub mod quantity;
pub mod sale;
pub mod transfer;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, Rate};
pub use numbering::{DocumentType, NumberingSequence};
pub use quantity::Quantity;
pub use sale::{PosStatus, Sale, SaleDocument, SaleLine, SaleStatus};
pub use transfer::{StockTransfer, StockTransferDocument, StockTransferLine, TransferAction, TransferStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on a single sale or transfer.
pub const MAX_DOCUMENT_ITEMS: usize = 500;

/// Largest quantity on one sale line, in whole units.
pub const MAX_LINE_QUANTITY_UNITS: i64 = 1_000_000;

/// Largest unit price on one sale line, in cents ($10,000,000.00).
pub const MAX_UNIT_PRICE_CENTS: i64 = 1_000_000_000;

/// Maximum length of a client-supplied idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 100;

/// Maximum length of free-text notes on a document.
pub const MAX_NOTES_LEN: usize = 1000;

/// Loyalty points per major currency unit when a company has no settings row.
pub const DEFAULT_POINTS_PER_CURRENCY: i64 = 1;
