//! # Sale Pricing
//!
//! Line pricing, header totals and the promotion audit split.
//!
//! ## Calculation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  per line                                                               │
//! │    gross       = round(qty × unit_price)                               │
//! │    discount    = round(gross × discount_bps / 10000)                   │
//! │    line_total  = gross − discount                                      │
//! │    tax         = round(line_total × tax_bps / 10000)                   │
//! │                                                                         │
//! │  header                                                                 │
//! │    subtotal    = Σ line_total                                          │
//! │    tax         = Σ line tax                                            │
//! │    discount    = header discount + promotion discount (capped)        │
//! │    total       = subtotal + tax − discount        (never < 0)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Rate};
use crate::promotion::PromotionDiscount;
use crate::quantity::Quantity;

// =============================================================================
// Line Pricing
// =============================================================================

/// Amounts for one priced line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub gross: Money,
    pub discount: Money,
    pub line_total: Money,
    pub tax: Money,
}

/// Prices one line. Fails when any amount leaves the `i64` cent range.
///
/// ## Example
/// ```rust
/// use keystone_core::money::{Money, Rate};
/// use keystone_core::pricing::price_line;
/// use keystone_core::quantity::Quantity;
///
/// let line = price_line(
///     Quantity::from_units(2),
///     Money::from_cents(1000),
///     Rate::from_percent(10),
///     Rate::zero(),
/// )
/// .unwrap();
/// assert_eq!(line.line_total.cents(), 1800);
/// ```
pub fn price_line(quantity: Quantity, unit_price: Money, discount: Rate, tax_rate: Rate) -> CoreResult<PricedLine> {
    let gross = quantity
        .checked_extend(unit_price)
        .ok_or(CoreError::AmountOverflow { what: "line amount" })?;
    let discount = gross
        .checked_apply_rate(discount)
        .ok_or(CoreError::AmountOverflow { what: "line discount" })?;
    let line_total = gross
        .checked_sub(discount)
        .ok_or(CoreError::AmountOverflow { what: "line total" })?;
    let tax = line_total
        .checked_apply_rate(tax_rate)
        .ok_or(CoreError::AmountOverflow { what: "line tax" })?;
    Ok(PricedLine {
        gross,
        discount,
        line_total,
        tax,
    })
}

/// Σ line totals: the amount promotions are evaluated against.
pub fn provisional_subtotal(lines: &[PricedLine]) -> CoreResult<Money> {
    checked_sum(lines.iter().map(|l| l.line_total), "subtotal")
}

fn checked_sum(mut amounts: impl Iterator<Item = Money>, what: &'static str) -> CoreResult<Money> {
    amounts
        .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
        .ok_or(CoreError::AmountOverflow { what })
}

// =============================================================================
// Header Totals
// =============================================================================

/// Header amounts of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub tax: Money,
    /// Header discount plus the promotion discount actually applied.
    pub discount: Money,
    /// Portion of `discount` that came from promotions.
    pub promotion_discount: Money,
    pub total: Money,
}

/// Folds lines, the caller's header discount and promotion discounts into
/// header totals.
///
/// A header discount larger than `subtotal + tax` is rejected; the promotion
/// discount is capped at whatever remains.
pub fn sale_totals(
    lines: &[PricedLine],
    header_discount: Money,
    promotion_discount: Money,
) -> CoreResult<SaleTotals> {
    let subtotal = provisional_subtotal(lines)?;
    let tax = checked_sum(lines.iter().map(|l| l.tax), "tax")?;
    let available = subtotal
        .checked_add(tax)
        .ok_or(CoreError::AmountOverflow { what: "sale total" })?;

    if header_discount > available {
        return Err(CoreError::DiscountExceedsTotal {
            discount_cents: header_discount.cents(),
            available_cents: available.cents(),
        });
    }

    let remaining = available - header_discount;
    let promotion_discount = promotion_discount.clamp_non_negative().min(remaining);
    let discount = header_discount + promotion_discount;

    Ok(SaleTotals {
        subtotal,
        tax,
        discount,
        promotion_discount,
        total: subtotal + tax - discount,
    })
}

/// Resolves the paid amount: `None` means fully paid.
pub fn resolve_paid(paid: Option<Money>, total: Money) -> CoreResult<Money> {
    let paid = paid.unwrap_or(total);
    if paid.is_negative() || paid > total {
        return Err(CoreError::InvalidPaidAmount {
            paid_cents: paid.cents(),
            total_cents: total.cents(),
        });
    }
    Ok(paid)
}

// =============================================================================
// Promotion Audit Split
// =============================================================================

/// Divides the applied promotion discount evenly across the matched
/// promotions. Leading promotions take the remainder cents.
///
/// ## Example
/// ```rust
/// use keystone_core::money::Money;
/// use keystone_core::pricing::split_promotion_discount;
/// use keystone_core::promotion::PromotionDiscount;
///
/// let matched = [
///     PromotionDiscount { promotion_id: 4, discount: Money::from_cents(500) },
///     PromotionDiscount { promotion_id: 9, discount: Money::from_cents(1) },
/// ];
/// let split = split_promotion_discount(Money::from_cents(501), &matched);
/// assert_eq!(split, vec![(4, Money::from_cents(251)), (9, Money::from_cents(250))]);
/// ```
pub fn split_promotion_discount(applied: Money, matched: &[PromotionDiscount]) -> Vec<(i64, Money)> {
    matched
        .iter()
        .map(|p| p.promotion_id)
        .zip(applied.split_evenly(matched.len()))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_cart() -> Vec<PricedLine> {
        vec![
            price_line(
                Quantity::from_units(2),
                Money::from_cents(1000),
                Rate::from_percent(10),
                Rate::zero(),
            )
            .unwrap(),
            price_line(Quantity::from_units(1), Money::from_cents(500), Rate::zero(), Rate::zero()).unwrap(),
        ]
    }

    #[test]
    fn test_basic_sale_scenario() {
        let totals = sale_totals(&basic_cart(), Money::zero(), Money::zero()).unwrap();
        assert_eq!(totals.subtotal.cents(), 2300);
        assert_eq!(totals.tax.cents(), 0);
        assert_eq!(totals.total.cents(), 2300);
        assert_eq!(totals.total, totals.subtotal + totals.tax - totals.discount);
    }

    #[test]
    fn test_tax_applies_after_line_discount() {
        let line = price_line(
            Quantity::from_units(3),
            Money::from_cents(999),
            Rate::from_percent(5),
            Rate::from_bps(825),
        )
        .unwrap();
        assert_eq!(line.gross.cents(), 2997);
        assert_eq!(line.discount.cents(), 150);
        assert_eq!(line.line_total.cents(), 2847);
        assert_eq!(line.tax.cents(), 235);
    }

    #[test]
    fn test_header_discount_over_total_is_rejected() {
        let err = sale_totals(&basic_cart(), Money::from_cents(2301), Money::zero()).unwrap_err();
        assert!(matches!(err, CoreError::DiscountExceedsTotal { .. }));
    }

    #[test]
    fn test_promotion_discount_is_capped() {
        let totals = sale_totals(&basic_cart(), Money::from_cents(300), Money::from_cents(5000)).unwrap();
        assert_eq!(totals.promotion_discount.cents(), 2000);
        assert_eq!(totals.discount.cents(), 2300);
        assert_eq!(totals.total, Money::zero());
    }

    #[test]
    fn test_paid_defaults_to_total_and_is_bounded() {
        let total = Money::from_cents(2300);
        assert_eq!(resolve_paid(None, total).unwrap(), total);
        assert_eq!(resolve_paid(Some(Money::from_cents(1000)), total).unwrap().cents(), 1000);
        assert!(resolve_paid(Some(Money::from_cents(2301)), total).is_err());
        assert!(resolve_paid(Some(Money::from_cents(-1)), total).is_err());
    }

    #[test]
    fn test_overflowing_line_is_rejected() {
        let err = price_line(
            Quantity::from_units(10_000_000_000),
            Money::from_cents(10_000_000_000),
            Rate::zero(),
            Rate::zero(),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::AmountOverflow { what: "line amount" }));

        let big = price_line(Quantity::from_units(1), Money::from_cents(i64::MAX / 2 + 1), Rate::zero(), Rate::zero())
            .unwrap();
        let err = sale_totals(&[big, big], Money::zero(), Money::zero()).unwrap_err();
        assert!(matches!(err, CoreError::AmountOverflow { what: "subtotal" }));
    }

    #[test]
    fn test_split_with_no_promotions_is_empty() {
        assert!(split_promotion_discount(Money::from_cents(100), &[]).is_empty());
    }
}
