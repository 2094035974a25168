//! # Sale Types
//!
//! Sale headers, lines, applied promotions and the sale requests.
//!
//! ## Status Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  status      pos_status   meaning                    stock moved?      │
//! │  ─────────   ──────────   ─────────────────────────  ────────────      │
//! │  DRAFT       ACTIVE       open at the till           no                │
//! │  DRAFT       HOLD         parked ("held sale")       no                │
//! │  COMPLETED   COMPLETED    checked out                yes               │
//! │  VOID        (kept)       voided original            reversed by the   │
//! │                                                      void document     │
//! │                                                                         │
//! │  A void document is itself a sale row with status VOID and            │
//! │  `voids_sale_id` pointing at the original.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Rate};
use crate::quantity::Quantity;

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaleStatus {
    Draft,
    Completed,
    Void,
}

impl SaleStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Draft => "DRAFT",
            SaleStatus::Completed => "COMPLETED",
            SaleStatus::Void => "VOID",
        }
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Till-side status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PosStatus {
    Active,
    Hold,
    Completed,
}

impl PosStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PosStatus::Active => "ACTIVE",
            PosStatus::Hold => "HOLD",
            PosStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for PosStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Persisted Rows
// =============================================================================

/// Sale header (`sales`).
///
/// Invariant: `total = subtotal + tax - discount`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub company_id: i64,
    pub location_id: i64,
    pub sale_number: String,
    pub customer_id: Option<i64>,
    pub created_by: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub paid_cents: i64,
    pub status: SaleStatus,
    pub pos_status: PosStatus,
    pub is_quick_sale: bool,
    /// Set on void documents: the sale being voided.
    pub voids_sale_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub notes: Option<String>,
    pub payment_method_id: Option<i64>,
    pub is_deleted: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    /// Checks `total == subtotal + tax - discount`.
    pub fn is_balanced(&self) -> bool {
        self.total_cents == self.subtotal_cents + self.tax_cents - self.discount_cents
    }

    /// True for a parked DRAFT sale.
    pub fn is_held(&self) -> bool {
        self.status == SaleStatus::Draft && self.pos_status == PosStatus::Hold
    }
}

/// Sale line (`sale_details`). Product data is frozen at sale time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLine {
    pub id: i64,
    pub sale_id: i64,
    /// `None` for freeform lines; those never touch stock.
    pub product_id: Option<i64>,
    pub description: Option<String>,
    pub quantity_milli: i64,
    pub unit_price_cents: i64,
    pub discount_bps: i64,
    pub discount_cents: i64,
    pub tax_id: Option<i64>,
    pub tax_cents: i64,
    /// After line discount, before tax.
    pub line_total_cents: i64,
    /// Comma-separated serials, if the line is serialized.
    pub serial_numbers: Option<String>,
}

impl SaleLine {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_milli(self.quantity_milli)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    pub fn serials(&self) -> Vec<String> {
        self.serial_numbers
            .as_deref()
            .map(|s| {
                s.split(',')
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Audit row for a promotion applied to a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AppliedPromotion {
    pub id: i64,
    pub sale_id: i64,
    pub promotion_id: i64,
    pub discount_cents: i64,
}

/// Header, lines and applied promotions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDocument {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
    pub promotions: Vec<AppliedPromotion>,
}

impl SaleDocument {
    /// Checks that the header subtotal and tax equal the sums over the lines.
    pub fn lines_match_header(&self) -> bool {
        let subtotal: i64 = self.lines.iter().map(|l| l.line_total_cents).sum();
        let tax: i64 = self.lines.iter().map(|l| l.tax_cents).sum();
        subtotal == self.sale.subtotal_cents && tax == self.sale.tax_cents
    }
}

// =============================================================================
// Requests
// =============================================================================

/// One cart line as sent by the till.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItemRequest {
    #[serde(default)]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Money,
    /// Line discount percentage.
    #[serde(default)]
    pub discount: Rate,
    /// Explicit tax code; falls back to the product's tax.
    #[serde(default)]
    pub tax_id: Option<i64>,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
}

impl SaleItemRequest {
    /// Plain product line, no discount, no tax override.
    pub fn product(product_id: i64, quantity: Quantity, unit_price: Money) -> Self {
        SaleItemRequest {
            product_id: Some(product_id),
            description: None,
            quantity,
            unit_price,
            discount: Rate::zero(),
            tax_id: None,
            serial_numbers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreateSaleRequest {
    #[serde(default)]
    pub customer_id: Option<i64>,
    pub items: Vec<SaleItemRequest>,
    /// Header discount on top of line discounts; promotions add to it.
    #[serde(default)]
    pub discount: Money,
    /// Defaults to the sale total.
    #[serde(default)]
    pub paid_amount: Option<Money>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<i64>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

/// Edits to a sale header that leave its amounts alone.
///
/// Unknown fields are rejected at parse time, so a body carrying
/// `total` or `status` never reaches the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[serde(deny_unknown_fields)]
#[ts(export)]
pub struct UpdateSaleRequest {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<i64>,
}

impl UpdateSaleRequest {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.payment_method_id.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VoidSaleRequest {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn line(serials: Option<&str>) -> SaleLine {
        SaleLine {
            id: 1,
            sale_id: 1,
            product_id: Some(1),
            description: None,
            quantity_milli: 2000,
            unit_price_cents: 1000,
            discount_bps: 1000,
            discount_cents: 200,
            tax_id: None,
            tax_cents: 0,
            line_total_cents: 1800,
            serial_numbers: serials.map(str::to_string),
        }
    }

    #[test]
    fn test_serials_split() {
        assert_eq!(line(Some("A1,B2")).serials(), vec!["A1", "B2"]);
        assert!(line(None).serials().is_empty());
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SaleStatus::Void.to_string(), "VOID");
        assert_eq!(PosStatus::Hold.to_string(), "HOLD");
        assert_eq!(serde_json::to_string(&SaleStatus::Completed).unwrap(), "\"COMPLETED\"");
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: CreateSaleRequest = serde_json::from_str(
            r#"{"items":[{"product_id":1,"quantity":2000,"unit_price":1000}]}"#,
        )
        .unwrap();
        assert_eq!(req.discount, Money::zero());
        assert!(req.paid_amount.is_none());
        assert_eq!(req.items[0].discount, Rate::zero());
        assert_eq!(req.items[0].quantity, Quantity::from_units(2));
        assert!(req.payment_method_id.is_none());
    }

    #[test]
    fn test_update_request_refuses_financial_fields() {
        let ok: UpdateSaleRequest = serde_json::from_str(r#"{"notes":"gift","payment_method_id":3}"#).unwrap();
        assert_eq!(ok.notes.as_deref(), Some("gift"));
        assert_eq!(ok.payment_method_id, Some(3));

        assert!(serde_json::from_str::<UpdateSaleRequest>(r#"{"total_cents":1}"#).is_err());
        assert!(serde_json::from_str::<UpdateSaleRequest>(r#"{"notes":"x","status":"VOID"}"#).is_err());
        assert!(serde_json::from_str::<UpdateSaleRequest>("{}").unwrap().is_empty());
    }
}
