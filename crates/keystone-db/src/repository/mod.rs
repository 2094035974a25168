//! # Repository Module
//!
//! Database repository implementations for Keystone.
//!
//! ## Two Kinds of Access
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Pool vs. Transaction Access                          │
//! │                                                                         │
//! │  Pool-level (repository structs)                                       │
//! │       db.sales().document(company_id, sale_id)                         │
//! │       → acquires a pooled connection per call                          │
//! │       → used for reads before a transaction and for standalone writes  │
//! │                                                                         │
//! │  Transaction-scoped (free functions)                                   │
//! │       let mut tx = db.begin().await?;                                  │
//! │       numbering::increment(&mut tx, ...).await?;                       │
//! │       stock::adjust(&mut tx, ...).await?;                              │
//! │       sale::insert_sale(&mut tx, ...).await?;                          │
//! │       tx.commit().await?;                                              │
//! │       → take `&mut SqliteConnection`, never open their own tx          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`catalog`] - Companies, locations, customers, products, taxes, promotions
//! - [`numbering`] - Numbering sequence counters
//! - [`stock`] - Stock records, movements and adjustments
//! - [`sale`] - Sales, sale lines and applied promotions
//! - [`transfer`] - Stock transfers and their lines
//! - [`ledger`] - Ledger postings
//! - [`loyalty`] - Loyalty settings, accounts and awards
//! - [`side_effects`] - Post-commit work queue
//! - [`idempotency`] - Client idempotency keys

pub mod catalog;
pub mod idempotency;
pub mod ledger;
pub mod loyalty;
pub mod numbering;
pub mod sale;
pub mod side_effects;
pub mod stock;
pub mod transfer;
