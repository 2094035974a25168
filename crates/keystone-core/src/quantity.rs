//! # Quantity Module
//!
//! Fixed-point quantities with three decimal places.
//!
//! Stock can be counted in pieces (`2`) or measured (`1.250` kg), so the
//! ledger stores thousandths in an `i64`. Signed: stock deltas and void
//! mirror lines are negative.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::money::{checked_div_round, div_round, Money};

/// Thousandths per unit.
pub const QUANTITY_SCALE: i64 = 1_000;

/// A signed quantity in thousandths of a unit.
///
/// ## Example
/// ```rust
/// use keystone_core::quantity::Quantity;
///
/// let q = Quantity::from_units(2);
/// assert_eq!(q.milli(), 2000);
/// assert!(q.is_whole());
/// assert_eq!(Quantity::from_milli(1250).to_string(), "1.250");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * QUANTITY_SCALE)
    }

    /// Raw thousandths.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// True when the quantity has no fractional part.
    #[inline]
    pub const fn is_whole(&self) -> bool {
        self.0 % QUANTITY_SCALE == 0
    }

    /// Whole units, truncated toward zero.
    #[inline]
    pub const fn whole_units(&self) -> i64 {
        self.0 / QUANTITY_SCALE
    }

    /// Extends a unit price over this quantity: `round(price × qty)`.
    ///
    /// ## Example
    /// ```rust
    /// use keystone_core::money::Money;
    /// use keystone_core::quantity::Quantity;
    ///
    /// let unit = Money::from_cents(299);
    /// assert_eq!(Quantity::from_units(3).extend(unit).cents(), 897);
    /// // 0.5 kg at $2.99/kg = $1.495 → $1.50
    /// assert_eq!(Quantity::from_milli(500).extend(unit).cents(), 150);
    /// ```
    pub fn extend(&self, unit_price: Money) -> Money {
        Money::from_cents(div_round(
            unit_price.cents() as i128 * self.0 as i128,
            QUANTITY_SCALE as i128,
        ))
    }

    /// [`Quantity::extend`], or `None` when the amount leaves `i64`.
    pub fn checked_extend(&self, unit_price: Money) -> Option<Money> {
        checked_div_round(unit_price.cents() as i128 * self.0 as i128, QUANTITY_SCALE as i128)
            .map(Money::from_cents)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        if abs % QUANTITY_SCALE == 0 {
            write!(f, "{}{}", sign, abs / QUANTITY_SCALE)
        } else {
            write!(f, "{}{}.{:03}", sign, abs / QUANTITY_SCALE, abs % QUANTITY_SCALE)
        }
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Quantity {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Quantity(-self.0)
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Quantity::from_units(5).to_string(), "5");
        assert_eq!(Quantity::from_milli(1250).to_string(), "1.250");
        assert_eq!(Quantity::from_milli(-500).to_string(), "-0.500");
    }

    #[test]
    fn test_whole_units() {
        assert!(Quantity::from_units(3).is_whole());
        assert!(!Quantity::from_milli(3001).is_whole());
        assert_eq!(Quantity::from_milli(3999).whole_units(), 3);
    }

    #[test]
    fn test_extend_negative_mirrors_positive() {
        let unit = Money::from_cents(1000);
        assert_eq!(Quantity::from_units(2).extend(unit).cents(), 2000);
        assert_eq!(Quantity::from_units(-2).extend(unit).cents(), -2000);
        assert_eq!(Quantity::from_milli(-333).extend(Money::from_cents(3)).cents(), -1);
    }

    #[test]
    fn test_sum() {
        let total: Quantity = [Quantity::from_units(2), Quantity::from_milli(500)]
            .into_iter()
            .sum();
        assert_eq!(total.milli(), 2500);
    }
}
