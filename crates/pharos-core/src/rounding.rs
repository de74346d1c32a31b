//! # Rounding Policy
//!
//! Shared numeric rules for every monetary value the engine emits.
//!
//! ## When Rounding Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  base 100.00 ──► override 80.00 ──► rule -12.5% ──► promo -3.333...    │
//! │                                                                         │
//! │  Intermediate steps keep full Decimal precision.                        │
//! │  Only the PricedLine fields are rounded, once, at the very end.        │
//! │                                                                         │
//! │  Mode: round-half-away-from-zero                                        │
//! │    2.345 → 2.35      -2.345 → -2.35      2.344 → 2.34                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Default number of minor-unit digits (cents).
pub const DEFAULT_SCALE: u32 = 2;

/// Currency precision and rounding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundingPolicy {
    scale: u32,
}

impl RoundingPolicy {
    /// Creates a policy for a currency with `scale` minor-unit digits.
    ///
    /// ## Example
    /// ```rust
    /// use pharos_core::rounding::RoundingPolicy;
    ///
    /// let jpy = RoundingPolicy::new(0);
    /// assert_eq!(jpy.scale(), 0);
    /// ```
    pub const fn new(scale: u32) -> Self {
        RoundingPolicy { scale }
    }

    /// Number of minor-unit digits.
    #[inline]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// Rounds a raw decimal to the currency's minor unit.
    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.scale, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Rounds a raw decimal and wraps it as [`Money`].
    #[inline]
    pub fn money(&self, value: Decimal) -> Money {
        let mut rounded = self.round(value);
        rounded.rescale(self.scale);
        Money::from_rounded(rounded)
    }

    /// Smallest representable amount (one minor unit).
    ///
    /// Each rounded amount is off by at most half of it.
    pub fn minor_unit(&self) -> Decimal {
        Decimal::new(1, self.scale)
    }
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        RoundingPolicy::new(DEFAULT_SCALE)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_half_away_from_zero() {
        let policy = RoundingPolicy::default();
        assert_eq!(policy.round(dec!(2.345)), dec!(2.35));
        assert_eq!(policy.round(dec!(-2.345)), dec!(-2.35));
        assert_eq!(policy.round(dec!(2.344)), dec!(2.34));
        // Bankers rounding would give 0.12 here
        assert_eq!(policy.round(dec!(0.125)), dec!(0.13));
    }

    #[test]
    fn test_zero_scale_currency() {
        let policy = RoundingPolicy::new(0);
        assert_eq!(policy.round(dec!(10.5)), dec!(11));
        assert_eq!(policy.minor_unit(), dec!(1));
    }

    #[test]
    fn test_minor_unit() {
        assert_eq!(RoundingPolicy::default().minor_unit(), dec!(0.01));
        assert_eq!(RoundingPolicy::new(3).minor_unit(), dec!(0.001));
    }
}
