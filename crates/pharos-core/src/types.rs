//! # Domain Types
//!
//! Value objects the engine reads from its collaborators.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    Customer     │   │    TaxRate      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  id             │   │  bps (u32)      │       │
//! │  │  unit_price     │   │  tier           │   │  800 = 8.00%    │       │
//! │  │  tax_rate_bps   │   │  customer_type  │   └─────────────────┘       │
//! │  │  category_id    │   │  region_id      │                             │
//! │  │  manufacturer_id│   └─────────────────┘                             │
//! │  └─────────────────┘                                                    │
//! │   (owned by Catalog)    (owned by Customer Directory)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both are read-only to the engine and are always fetched eagerly before
//! a resolution call starts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 800 bps = 8%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a fraction (800 bps → 0.08).
    pub fn fraction(&self) -> Decimal {
        Decimal::new(i64::from(self.0), 4)
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Unrounded tax on `amount`.
    ///
    /// ## Example
    /// ```rust
    /// use pharos_core::types::TaxRate;
    /// use rust_decimal::Decimal;
    ///
    /// let rate = TaxRate::from_bps(825);
    /// assert_eq!(rate.apply(Decimal::from(10)), Decimal::new(825, 3));
    /// ```
    pub fn apply(&self, amount: Decimal) -> Decimal {
        amount * self.fraction()
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Customer Classification
// =============================================================================

/// Ordered customer classification controlling discount eligibility.
///
/// Declaration order is the ordering: `Basic < Standard < Premium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CustomerTier {
    Basic,
    Standard,
    Premium,
}

/// Kind of buying organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    Pharmacy,
    Hospital,
    Wholesale,
    Clinic,
    Other,
}

/// Pricing track for the same product (e.g. state-subsidised vs. commercial).
///
/// Only overrides are tagged with a category; rules and promotions apply
/// across all tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PriceCategory {
    #[default]
    Commercial,
    Subsidized,
    Institutional,
}

// =============================================================================
// Product
// =============================================================================

/// Catalog product as seen by the pricing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name (audit output only).
    pub name: String,

    /// List price per unit, before any override or discount.
    pub unit_price: Decimal,

    /// Tax rate in basis points (800 = 8%).
    pub tax_rate_bps: u32,

    pub category_id: String,

    pub manufacturer_id: String,

    /// Inactive products cannot be priced.
    pub is_active: bool,
}

impl Product {
    /// Returns the tax rate.
    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Buying customer as seen by the pricing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub tier: CustomerTier,
    pub customer_type: CustomerType,
    pub region_id: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tax_rate_fraction() {
        let rate = TaxRate::from_bps(800);
        assert_eq!(rate.bps(), 800);
        assert_eq!(rate.fraction(), dec!(0.08));
        assert_eq!(rate.apply(dec!(90)), dec!(7.2));
    }

    #[test]
    fn test_tier_ordering() {
        assert!(CustomerTier::Premium > CustomerTier::Standard);
        assert!(CustomerTier::Standard > CustomerTier::Basic);
    }

    #[test]
    fn test_price_category_default() {
        assert_eq!(PriceCategory::default(), PriceCategory::Commercial);
    }

    #[test]
    fn test_enum_serialization() {
        let json = serde_json::to_string(&CustomerType::Hospital).unwrap();
        assert_eq!(json, "\"hospital\"");

        let tier: CustomerTier = serde_json::from_str("\"premium\"").unwrap();
        assert_eq!(tier, CustomerTier::Premium);
    }
}
