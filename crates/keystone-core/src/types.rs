//! # Domain Types
//!
//! Tenant catalog rows, stock records, ledger and loyalty rows.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Domain Types                                   │
//! │                                                                         │
//! │  Tenancy            Catalog             Stock               Finance    │
//! │  ─────────          ─────────           ─────────           ────────   │
//! │  Company            Product             StockRecord         LedgerEntry│
//! │  Location           Category            StockMovement       Loyalty-   │
//! │  Customer           Tax                 StockAdjustment       Account  │
//! │                     PaymentMethod       StockLevel                     │
//! │                                                                         │
//! │  Company ──< Location ──< StockRecord >── Product                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Rate};
use crate::quantity::Quantity;

// =============================================================================
// Tenancy
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Location {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub is_deleted: bool,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Category {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
}

/// A tax code with its percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Tax {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    /// Percentage in basis points (825 = 8.25%).
    pub rate_bps: i64,
    pub is_active: bool,
}

impl Tax {
    pub fn rate(&self) -> Rate {
        Rate::from_bps(self.rate_bps.clamp(0, u32::MAX as i64) as u32)
    }
}

/// A tender a sale can be recorded against (cash, card, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentMethod {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub is_active: bool,
}

/// A sellable product.
///
/// `tax_id` is the default tax for sale lines that do not name one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub company_id: i64,
    pub category_id: Option<i64>,
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    pub tax_id: Option<i64>,
    pub is_active: bool,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

// =============================================================================
// Stock
// =============================================================================

/// Quantity on hand for one (location, product) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockRecord {
    pub location_id: i64,
    pub product_id: i64,
    pub quantity_milli: i64,
    pub reserved_quantity_milli: i64,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl StockRecord {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }

    #[inline]
    pub fn reserved_quantity(&self) -> Quantity {
        Quantity::from_milli(self.reserved_quantity_milli)
    }
}

/// A stock record joined with its product, for location listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLevel {
    pub location_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub sku: String,
    pub quantity_milli: i64,
    pub reserved_quantity_milli: i64,
    #[ts(as = "String")]
    pub last_updated: DateTime<Utc>,
}

impl StockLevel {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }

    /// On hand minus reserved.
    pub fn available(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli - self.reserved_quantity_milli)
    }
}

/// Why a stock record changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementCause {
    Sale,
    SaleVoid,
    TransferOut,
    TransferIn,
    Adjustment,
}

impl MovementCause {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementCause::Sale => "sale",
            MovementCause::SaleVoid => "sale_void",
            MovementCause::TransferOut => "transfer_out",
            MovementCause::TransferIn => "transfer_in",
            MovementCause::Adjustment => "adjustment",
        }
    }
}

impl fmt::Display for MovementCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the stock history (`stock_movements`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: i64,
    pub location_id: i64,
    pub product_id: i64,
    pub delta_milli: i64,
    pub cause: MovementCause,
    /// Document number that caused the movement.
    pub reference: Option<String>,
    pub created_by: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A manual stock adjustment document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockAdjustment {
    pub id: i64,
    pub company_id: i64,
    pub location_id: i64,
    pub product_id: i64,
    pub adjustment_number: String,
    pub delta_milli: i64,
    pub reason: String,
    pub created_by: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustmentRequest {
    pub product_id: i64,
    /// Signed change; negative deltas may not take stock below zero.
    pub delta: Quantity,
    pub reason: String,
}

// =============================================================================
// Ledger & Loyalty
// =============================================================================

/// Append-only debit/credit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerEntry {
    pub id: i64,
    pub company_id: i64,
    pub reference: String,
    pub debit_cents: i64,
    pub credit_cents: i64,
    pub created_by: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Credit minus debit.
    pub fn net(&self) -> Money {
        Money::from_cents(self.credit_cents - self.debit_cents)
    }
}

/// Accumulated loyalty points of one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LoyaltyAccount {
    pub customer_id: i64,
    pub company_id: i64,
    pub points: i64,
    pub total_earned: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// Points earned for `amount` at `points_per_currency` points per major unit.
///
/// ## Example
/// ```rust
/// use keystone_core::money::Money;
/// use keystone_core::types::loyalty_points;
///
/// assert_eq!(loyalty_points(Money::from_cents(2399), 1), 23);
/// assert_eq!(loyalty_points(Money::from_cents(-500), 1), 0);
/// ```
pub fn loyalty_points(amount: Money, points_per_currency: i64) -> i64 {
    if !amount.is_positive() || points_per_currency <= 0 {
        return 0;
    }
    ((amount.cents() as i128 * points_per_currency as i128) / 100) as i64
}

// =============================================================================
// Idempotency
// =============================================================================

/// A document created under a client-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct IdempotencyRecord {
    pub company_id: i64,
    pub key: String,
    pub operation: String,
    pub document_id: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_row() {
        let tax = Tax {
            id: 1,
            company_id: 1,
            name: "VAT".to_string(),
            rate_bps: 1500,
            is_active: true,
        };
        assert_eq!(tax.rate(), Rate::from_percent(15));
    }

    #[test]
    fn test_ledger_net() {
        let entry = LedgerEntry {
            id: 1,
            company_id: 1,
            reference: "sale:INV-000001".to_string(),
            debit_cents: 0,
            credit_cents: 2300,
            created_by: 1,
            created_at: Utc::now(),
        };
        assert_eq!(entry.net().cents(), 2300);
    }

    #[test]
    fn test_loyalty_points_scale_with_rate() {
        assert_eq!(loyalty_points(Money::from_cents(10_000), 2), 200);
        assert_eq!(loyalty_points(Money::from_cents(99), 1), 0);
        assert_eq!(loyalty_points(Money::from_cents(10_000), 0), 0);
    }

    #[test]
    fn test_movement_cause_labels() {
        assert_eq!(MovementCause::TransferOut.to_string(), "transfer_out");
        let json = serde_json::to_string(&MovementCause::SaleVoid).unwrap();
        assert_eq!(json, "\"sale_void\"");
    }
}
