//! # pharos-core: Pure Price & Discount Resolution for Pharos
//!
//! This crate is the **heart** of the Pharos pricing engine. It turns an
//! eagerly fetched snapshot of overrides, rules and promotions into one
//! deterministic, auditable price, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Pharos Pricing Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Order subsystem                              │   │
//! │  │        ResolvePrice(product, customer, qty, as_of, codes)       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               pharos-db: PricingService                         │   │
//! │  │     active snapshot fetch, usage ledger on the order tx         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ PricingSnapshot                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pharos-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │ overrides │  │   rules   │  │promotions │  │ resolver  │  │   │
//! │  │   │  Store    │  │  Matcher  │  │  Ledger   │  │PricedLine │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                    rounding · money · validity                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO WALL CLOCK • PURE FUNCTIONS         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`rounding`] - RoundingPolicy (scale, half-away-from-zero)
//! - [`money`] - Money, an already-rounded amount
//! - [`types`] - Product, Customer, tiers and price categories
//! - [`validity`] - The single `is_active(entity, as_of)` predicate
//! - [`overrides`] - PriceOverrideStore
//! - [`rules`] - RuleMatcher
//! - [`promotions`] - PromotionLedger and usage stores
//! - [`resolver`] - PriceResolver and PricedLine
//! - [`audit`] - Adjustments and ambiguous-match warnings
//! - [`error`] - Domain error types
//! - [`validation`] - Request and definition validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same snapshot + same request = same PricedLine
//! 2. **No I/O**: data is fetched before resolution, never during it
//! 3. **Exact Until Output**: Decimal arithmetic, one rounding step at the end
//! 4. **Explicit Errors**: rejections are typed, never silently dropped
//!
//! ## Example Usage
//!
//! ```rust
//! use pharos_core::rounding::RoundingPolicy;
//! use rust_decimal::Decimal;
//!
//! let policy = RoundingPolicy::default();
//! let price = policy.money(Decimal::new(100005, 4)); // 10.0005
//! assert_eq!(price.to_string(), "10.00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod error;
pub mod money;
pub mod overrides;
pub mod promotions;
pub mod resolver;
pub mod rounding;
pub mod rules;
pub mod types;
pub mod validation;
pub mod validity;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use pharos_core::PriceResolver` instead of
// `use pharos_core::resolver::PriceResolver`

pub use audit::{AdjustmentSource, AmbiguousMatch, PriceAdjustment};
pub use error::{CoreResult, PricingError, PromotionRejection, UsageConflict, ValidationError};
pub use money::Money;
pub use overrides::{PriceOverride, PriceOverrideStore};
pub use promotions::{
    InMemoryUsageStore, Promotion, PromotionKind, PromotionLedger, PromotionSnapshot,
    PromotionTarget, PromotionUsage, UsageStore,
};
pub use resolver::{PriceRequest, PriceResolver, PricedLine, PricingSnapshot, RedeemedLine};
pub use rounding::RoundingPolicy;
pub use rules::{DiscountKind, DiscountRule, RuleMatcher, RuleScope};
pub use types::*;
pub use validity::{is_active, Validity, ValidityWindow};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity on a single priced line.
///
/// ## Business Reason
/// Catches typos (100000 instead of 100) before they reach a tender.
pub const MAX_LINE_QUANTITY: u32 = 100_000;

/// Largest amount accepted for any price, discount value or order minimum.
///
/// Keeps `price * MAX_LINE_QUANTITY` and the tax on it well inside
/// `Decimal` range.
pub const MAX_AMOUNT: i64 = 1_000_000_000;
