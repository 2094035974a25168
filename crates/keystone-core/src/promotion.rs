//! # Promotion Eligibility
//!
//! Pure evaluation of company promotions against a cart.
//!
//! ## Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A promotion applies when ALL of these hold:                            │
//! │                                                                         │
//! │  1. is_active, and `today` within [start_date, end_date] when set      │
//! │  2. cart subtotal ≥ min_amount (when set)                              │
//! │  3. scope matches:                                                      │
//! │       ALL         → always                                              │
//! │       PRODUCTS    → cart shares a product id with the promotion        │
//! │       CATEGORIES  → cart shares a category id with the promotion       │
//! │  4. the computed discount is positive                                   │
//! │                                                                         │
//! │  PERCENTAGE → subtotal × value_bps     FIXED → value_cents             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Rate};

// =============================================================================
// Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicableTo {
    All,
    Products,
    Categories,
}

impl fmt::Display for DiscountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscountType::Percentage => f.write_str("PERCENTAGE"),
            DiscountType::Fixed => f.write_str("FIXED"),
        }
    }
}

// =============================================================================
// Promotion Row
// =============================================================================

/// A company promotion (`promotions`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Promotion {
    pub id: i64,
    pub company_id: i64,
    pub name: String,
    pub discount_type: DiscountType,
    /// Basis points for PERCENTAGE, cents for FIXED.
    pub value: i64,
    pub min_amount_cents: Option<i64>,
    pub applicable_to: ApplicableTo,
    /// JSON array of product ids, used with `PRODUCTS`.
    pub product_ids: Option<String>,
    /// JSON array of category ids, used with `CATEGORIES`.
    pub category_ids: Option<String>,
    #[ts(as = "Option<String>")]
    pub start_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub end_date: Option<NaiveDate>,
    pub is_active: bool,
}

impl Promotion {
    /// Active flag and date window.
    pub fn is_running_on(&self, today: NaiveDate) -> bool {
        self.is_active
            && self.start_date.map_or(true, |start| start <= today)
            && self.end_date.map_or(true, |end| today <= end)
    }

    /// Discount this promotion grants on `subtotal`.
    pub fn discount_on(&self, subtotal: Money) -> Money {
        match self.discount_type {
            DiscountType::Percentage => {
                let bps = self.value.clamp(0, u32::MAX as i64) as u32;
                subtotal.apply_rate(Rate::from_bps(bps))
            }
            DiscountType::Fixed => Money::from_cents(self.value),
        }
    }

    fn scope_matches(&self, query: &PromotionQuery) -> bool {
        match self.applicable_to {
            ApplicableTo::All => true,
            ApplicableTo::Products => intersects(&parse_ids(&self.product_ids), &query.product_ids),
            ApplicableTo::Categories => {
                intersects(&parse_ids(&self.category_ids), &query.category_ids)
            }
        }
    }
}

/// Malformed or missing id lists match nothing.
fn parse_ids(raw: &Option<String>) -> HashSet<i64> {
    raw.as_deref()
        .and_then(|json| serde_json::from_str::<Vec<i64>>(json).ok())
        .unwrap_or_default()
        .into_iter()
        .collect()
}

fn intersects(scope: &HashSet<i64>, cart: &[i64]) -> bool {
    cart.iter().any(|id| scope.contains(id))
}

// =============================================================================
// Evaluation
// =============================================================================

/// What the cart looks like to the promotion engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionQuery {
    pub customer_id: i64,
    /// Σ discounted line totals, before tax.
    pub subtotal: Money,
    pub product_ids: Vec<i64>,
    pub category_ids: Vec<i64>,
}

/// One eligible promotion and the discount it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PromotionDiscount {
    pub promotion_id: i64,
    pub discount: Money,
}

/// Returns the promotions that apply to `query`, in input order.
pub fn evaluate(
    promotions: &[Promotion],
    query: &PromotionQuery,
    today: NaiveDate,
) -> Vec<PromotionDiscount> {
    promotions
        .iter()
        .filter(|p| p.is_running_on(today))
        .filter(|p| p.min_amount_cents.map_or(true, |min| query.subtotal.cents() >= min))
        .filter(|p| p.scope_matches(query))
        .filter_map(|p| {
            let discount = p.discount_on(query.subtotal);
            discount.is_positive().then_some(PromotionDiscount {
                promotion_id: p.id,
                discount,
            })
        })
        .collect()
}

/// Sum of all granted discounts.
pub fn total_discount(discounts: &[PromotionDiscount]) -> Money {
    discounts.iter().map(|d| d.discount).sum()
}

// =============================================================================
// Unit Tests
// =============================================================================
