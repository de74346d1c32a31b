//! # Money Module
//!
//! Provides the `Money` type for monetary values leaving the engine.
//!
//! ## Two Kinds of Numbers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Decimal (rust_decimal)            Money (this module)                 │
//! │  ─────────────────────             ───────────────────                 │
//! │  Working precision (28 digits)     Rounded to the currency minor unit  │
//! │  Used between resolver steps       Used in PricedLine fields only      │
//! │  80 × (1 − 12.5/100) = 70.0000     70.00                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A `Money` value can only be built through [`RoundingPolicy::money`] or
//! [`Money::from_rounded`], so an unrounded intermediate never leaks into
//! an output field by accident.
//!
//! ## Usage
//! ```rust
//! use pharos_core::rounding::RoundingPolicy;
//! use rust_decimal::Decimal;
//!
//! let policy = RoundingPolicy::default();
//! let price = policy.money(Decimal::new(10999, 3)); // 10.999
//! assert_eq!(price.to_string(), "11.00");
//! ```
//!
//! [`RoundingPolicy::money`]: crate::rounding::RoundingPolicy::money

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount already rounded to its currency's minor unit.
///
/// ## Design Decisions
/// - **Decimal, not i64 cents**: the minor-unit scale is configurable per
///   currency, so the value carries its own scale
/// - **Signed**: breakdown entries may be negative (an override above list price)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    /// Wraps an amount that has already been rounded.
    #[inline]
    pub const fn from_rounded(amount: Decimal) -> Self {
        Money(amount)
    }

    /// Returns the underlying decimal amount.
    #[inline]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns zero money value.
    ///
    /// ## Example
    /// ```rust
    /// use pharos_core::money::Money;
    ///
    /// let zero = Money::zero();
    /// assert!(zero.is_zero());
    /// ```
    #[inline]
    pub const fn zero() -> Self {
        Money(Decimal::ZERO)
    }

    /// Checks if the value is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
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

// =============================================================================
// Unit Tests
// =============================================================================
