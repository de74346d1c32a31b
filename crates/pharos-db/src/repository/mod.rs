//! # Repository Module
//!
//! Database repository implementations for the pricing engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Administrative tooling                 PricingService                  │
//! │       │                                      │                          │
//! │       │  db.rules().insert(&rule)            │  active_* / try_record   │
//! │       ▼                                      ▼                          │
//! │  &self methods on the pool            associated fns taking             │
//! │  (own implicit transaction)           &mut SqliteConnection             │
//! │                                       (the caller's order transaction)  │
//! │       │                                      │                          │
//! │       └──────────────┬───────────────────────┘                          │
//! │                      ▼                                                  │
//! │                SQLite Database                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Soft-deleted (`is_active = 0`) rows never leave this layer through the
//! `active_*` functions; the engine only sees live candidates.
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`](catalog::CatalogRepository) - Products and customers
//! - [`OverrideRepository`](overrides::OverrideRepository) - Price overrides
//! - [`RuleRepository`](rules::RuleRepository) - Discount rules
//! - [`PromotionRepository`](promotions::PromotionRepository) - Promotions and usage ledger

pub mod catalog;
pub mod overrides;
pub mod promotions;
pub mod rules;

use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Generates a new entity ID.
///
/// ## Usage
/// ```rust,ignore
/// let rule = DiscountRule { id: generate_id(), ... };
/// ```
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Column Conversions
// =============================================================================
// Money lives in TEXT columns and counts in INTEGER columns; both are
// checked on the way out instead of trusted.

pub(crate) fn parse_decimal(field: &str, raw: &str) -> DbResult<Decimal> {
    Decimal::from_str(raw).map_err(|_| DbError::corrupt(field, raw))
}

pub(crate) fn parse_optional_decimal(field: &str, raw: Option<&str>) -> DbResult<Option<Decimal>> {
    raw.map(|value| parse_decimal(field, value)).transpose()
}

pub(crate) fn to_u32(field: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::corrupt(field, value))
}

pub(crate) fn to_optional_u32(field: &str, value: Option<i64>) -> DbResult<Option<u32>> {
    value.map(|v| to_u32(field, v)).transpose()
}
