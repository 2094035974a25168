//! # Money Module
//!
//! Provides the `Money` and `Rate` types used for every monetary calculation.
//!
//! ## Integer Money
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Floating point:                                                        │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Ledger postings summed over a day drift by fractions of a cent and    │
//! │  `total == subtotal + tax - discount` stops holding exactly.           │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + Basis Points                            │
//! │    Money(i64)  = cents                                                  │
//! │    Rate(u32)   = basis points (10% = 1000)                              │
//! │    Every product that leaves the integer grid is rounded ONCE,         │
//! │    half away from zero, in i128.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use keystone_core::money::{Money, Rate};
//!
//! let price = Money::from_cents(1000); // $10.00
//! let discount = price.apply_rate(Rate::from_percent(10));
//! assert_eq!(discount.cents(), 100);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

/// Basis points in 100%.
pub const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Rounding
// =============================================================================

/// Divides `numer / denom`, rounding half away from zero.
///
/// ## Example
/// ```rust
/// use keystone_core::money::div_round;
///
/// assert_eq!(div_round(825, 100), 8);   // 8.25 → 8
/// assert_eq!(div_round(850, 100), 9);   // 8.5  → 9
/// assert_eq!(div_round(-850, 100), -9); // symmetric for refunds
/// ```
///
/// Quotients outside `i64` saturate; pricing goes through
/// [`checked_div_round`] instead.
pub fn div_round(numer: i128, denom: i128) -> i64 {
    checked_div_round(numer, denom).unwrap_or(if numer < 0 { i64::MIN } else { i64::MAX })
}

/// [`div_round`] that returns `None` when the quotient does not fit in `i64`.
///
/// ## Example
/// ```rust
/// use keystone_core::money::checked_div_round;
///
/// assert_eq!(checked_div_round(850, 100), Some(9));
/// assert_eq!(checked_div_round(i128::from(i64::MAX) * 1000, 10), None);
/// ```
pub fn checked_div_round(numer: i128, denom: i128) -> Option<i64> {
    debug_assert!(denom > 0);
    let half = denom / 2;
    let q = if numer >= 0 {
        numer.checked_add(half)? / denom
    } else {
        numer.checked_sub(half)? / denom
    };
    i64::try_from(q).ok()
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: void documents carry negative mirror amounts
/// - **Single field tuple struct**: zero-cost abstraction over i64
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  unit_price × quantity ──► gross ──► − line discount ──► line_total    │
/// │                                                         │              │
/// │  Σ line_total = subtotal ──► + Σ line tax ──► − header discount        │
/// │                                                         │              │
/// │                                                total ──► ledger post   │
/// │                                                       └─► loyalty award│
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use keystone_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
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

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the larger of `self` and zero.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Returns `self × rate`, rounded half away from zero.
    ///
    /// Used for line discounts, line tax and percentage promotions.
    ///
    /// ## Example
    /// ```rust
    /// use keystone_core::money::{Money, Rate};
    ///
    /// let amount = Money::from_cents(1000);
    /// assert_eq!(amount.apply_rate(Rate::from_bps(825)).cents(), 83);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        Money(div_round(self.0 as i128 * rate.bps() as i128, BPS_SCALE))
    }

    /// [`Money::apply_rate`], or `None` when the result leaves `i64`.
    pub fn checked_apply_rate(&self, rate: Rate) -> Option<Money> {
        checked_div_round(self.0 as i128 * rate.bps() as i128, BPS_SCALE).map(Money)
    }

    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Money> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_sub(&self, other: Money) -> Option<Money> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Splits the amount into `parts` whole-cent shares that add back up to
    /// the original. Remainder cents go one each to the leading shares.
    ///
    /// ## Example
    /// ```rust
    /// use keystone_core::money::Money;
    ///
    /// let shares = Money::from_cents(1000).split_evenly(3);
    /// let cents: Vec<i64> = shares.iter().map(|m| m.cents()).collect();
    /// assert_eq!(cents, vec![334, 333, 333]);
    /// ```
    pub fn split_evenly(&self, parts: usize) -> Vec<Money> {
        if parts == 0 {
            return Vec::new();
        }
        let n = parts as i64;
        let base = self.0 / n;
        let remainder = self.0 % n;
        let step = remainder.signum();
        (0..n)
            .map(|i| {
                if i < remainder.abs() {
                    Money(base + step)
                } else {
                    Money(base)
                }
            })
            .collect()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Rate
// =============================================================================

/// A percentage in basis points (1% = 100 bps, 100% = 10000 bps).
///
/// Line discounts, tax rates and percentage promotions all use this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from whole percent.
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        Rate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true when the rate is at most 100%.
    #[inline]
    pub const fn is_fraction(&self) -> bool {
        self.0 as i128 <= BPS_SCALE
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
