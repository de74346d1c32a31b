//! # Price Override Store
//!
//! Customer- and region-specific fixed unit prices.
//!
//! ## Selection Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  candidates = active, in-window, same product, same price category     │
//! │                                                                         │
//! │  1. specificity   customer-bound  >  region-bound  >  unbound           │
//! │  2. priority      higher wins                                           │
//! │  3. created_at    newer wins        ← tie: AmbiguousMatch warning       │
//! │  4. id            greater wins      ← only when timestamps are equal    │
//! │                                                                         │
//! │  no candidate → caller falls back to Product.unit_price                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::audit::{AmbiguousMatch, MatchKind, TieBreak};
use crate::types::PriceCategory;
use crate::validity::{is_active, Validity, ValidityWindow};

// =============================================================================
// Price Override
// =============================================================================

/// A fixed unit price for one product, optionally bound to a customer
/// and/or region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceOverride {
    pub id: String,
    pub product_id: String,
    pub region_id: Option<String>,
    pub customer_id: Option<String>,
    pub price_category: PriceCategory,
    pub unit_price: Decimal,
    #[serde(flatten)]
    pub window: ValidityWindow,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Validity for PriceOverride {
    fn enabled(&self) -> bool {
        self.is_active
    }

    fn window(&self) -> &ValidityWindow {
        &self.window
    }
}

/// How narrowly an override is bound. Ordered: `Unbound < Region < Customer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Specificity {
    Unbound,
    Region,
    Customer,
}

impl PriceOverride {
    pub fn specificity(&self) -> Specificity {
        if self.customer_id.is_some() {
            Specificity::Customer
        } else if self.region_id.is_some() {
            Specificity::Region
        } else {
            Specificity::Unbound
        }
    }

    fn matches(&self, query: &OverrideQuery<'_>) -> bool {
        self.product_id == query.product_id
            && self.price_category == query.price_category
            && bound_matches(self.customer_id.as_deref(), query.customer_id)
            && bound_matches(self.region_id.as_deref(), query.region_id)
            && is_active(self, query.as_of)
    }

    /// Ranking without the tie-break fields.
    fn rank(&self) -> (Specificity, i32) {
        (self.specificity(), self.priority)
    }
}

/// A `None` binding is a wildcard; a bound value must equal the query's.
fn bound_matches(bound: Option<&str>, requested: Option<&str>) -> bool {
    match bound {
        None => true,
        Some(value) => requested == Some(value),
    }
}

// =============================================================================
// Lookup
// =============================================================================

/// Inputs for an override lookup.
#[derive(Debug, Clone, Copy)]
pub struct OverrideQuery<'a> {
    pub product_id: &'a str,
    pub price_category: PriceCategory,
    pub customer_id: Option<&'a str>,
    pub region_id: Option<&'a str>,
    pub as_of: DateTime<Utc>,
}

/// The winning override and, if it won on a tie-break, the warning.
#[derive(Debug, Clone)]
pub struct OverrideMatch<'a> {
    pub winner: &'a PriceOverride,
    pub ambiguity: Option<AmbiguousMatch>,
}

/// Read-only view over an immutable snapshot of overrides.
#[derive(Debug, Clone, Copy)]
pub struct PriceOverrideStore<'a> {
    overrides: &'a [PriceOverride],
}

impl<'a> PriceOverrideStore<'a> {
    pub fn new(overrides: &'a [PriceOverride]) -> Self {
        PriceOverrideStore { overrides }
    }

    /// Picks the most specific applicable override, or `None`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let store = PriceOverrideStore::new(&snapshot.overrides);
    /// let price = store
    ///     .lookup(&query)
    ///     .map(|m| m.winner.unit_price)
    ///     .unwrap_or(product.unit_price);
    /// ```
    pub fn lookup(&self, query: &OverrideQuery<'_>) -> Option<OverrideMatch<'a>> {
        let mut candidates: Vec<&'a PriceOverride> =
            self.overrides.iter().filter(|o| o.matches(query)).collect();

        // Best first
        candidates.sort_by(|a, b| compare(b, a));

        let winner = *candidates.first()?;
        let tied: Vec<&PriceOverride> = candidates
            .iter()
            .skip(1)
            .copied()
            .filter(|o| o.rank() == winner.rank())
            .collect();

        let ambiguity = if tied.is_empty() {
            None
        } else {
            let decided_by = if tied.iter().any(|o| o.created_at == winner.created_at) {
                TieBreak::Identifier
            } else {
                TieBreak::MostRecent
            };
            Some(AmbiguousMatch {
                kind: MatchKind::Override,
                winner_id: winner.id.clone(),
                tied_with: tied.iter().map(|o| o.id.clone()).collect(),
                decided_by,
            })
        };

        Some(OverrideMatch { winner, ambiguity })
    }
}

/// Total order over overrides: `Greater` means `a` should win.
fn compare(a: &PriceOverride, b: &PriceOverride) -> Ordering {
    a.rank()
        .cmp(&b.rank())
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

// =============================================================================
// Unit Tests
// =============================================================================
