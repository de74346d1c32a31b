//! # Rule Matcher
//!
//! Scoped discount rules: many may match a line, exactly one applies.
//!
//! ## Matching
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  A rule is a candidate when ALL hold:                                  │
//! │    • active and in window at as_of                                      │
//! │    • scope target matches   global | product | category | manufacturer │
//! │    • tier / type / customer constraints hold (None = wildcard)          │
//! │    • quantity inside [min_quantity, max_quantity]                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Winner
//! ```text
//!   1. priority            higher wins
//!   2. specificity         customer-bound > product > category
//!                          > manufacturer > global
//!   3. customer benefit    lower resulting unit price wins
//!   4. created_at          newer wins       ← AmbiguousMatch warning
//!   5. id                  greater wins
//! ```
//!
//! Rules never compound: the winner is applied once to the incoming price.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::audit::{AmbiguousMatch, MatchKind, TieBreak};
use crate::types::{Customer, CustomerTier, CustomerType, Product};
use crate::validity::{is_active, Validity, ValidityWindow};

// =============================================================================
// Rule Definition
// =============================================================================

/// The breadth of products a rule applies to.
///
/// Declaration order is specificity order for tie-breaking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Manufacturer,
    Category,
    Product,
}

/// How a rule changes the unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// `price × (1 − value/100)`
    Percentage,
    /// `max(0, price − value)`
    FixedAmount,
    /// `value`, whatever the incoming price was
    FixedPrice,
}

/// Inclusive quantity bounds. `None` means unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuantityRange {
    pub min_quantity: Option<u32>,
    pub max_quantity: Option<u32>,
}

impl QuantityRange {
    pub const fn any() -> Self {
        QuantityRange {
            min_quantity: None,
            max_quantity: None,
        }
    }

    pub fn contains(&self, quantity: u32) -> bool {
        self.min_quantity.map_or(true, |min| quantity >= min)
            && self.max_quantity.map_or(true, |max| quantity <= max)
    }
}

/// A scoped discount rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRule {
    pub id: String,
    pub name: String,
    pub scope: RuleScope,
    /// Product, category or manufacturer id. Ignored for `Global`.
    pub target_id: Option<String>,
    pub customer_tier: Option<CustomerTier>,
    pub customer_type: Option<CustomerType>,
    pub customer_id: Option<String>,
    pub kind: DiscountKind,
    pub value: Decimal,
    #[serde(flatten)]
    pub quantity: QuantityRange,
    #[serde(flatten)]
    pub window: ValidityWindow,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Validity for DiscountRule {
    fn enabled(&self) -> bool {
        self.is_active
    }

    fn window(&self) -> &ValidityWindow {
        &self.window
    }
}

impl DiscountRule {
    /// Applies this rule to an incoming unit price. Never negative.
    ///
    /// ## Example
    /// ```rust,ignore
    /// // 10% off 80.00
    /// assert_eq!(rule.apply(dec!(80)), dec!(72));
    /// ```
    pub fn apply(&self, price: Decimal) -> Decimal {
        let discounted = match self.kind {
            DiscountKind::Percentage => price * (Decimal::ONE - self.value / Decimal::ONE_HUNDRED),
            DiscountKind::FixedAmount => price - self.value,
            DiscountKind::FixedPrice => self.value,
        };
        discounted.max(Decimal::ZERO)
    }

    /// `(customer_bound, scope)`: a customer-bound rule outranks any scope.
    fn specificity(&self) -> (bool, RuleScope) {
        (self.customer_id.is_some(), self.scope)
    }

    fn targets(&self, product: &Product) -> bool {
        let target = self.target_id.as_deref();
        match self.scope {
            RuleScope::Global => true,
            RuleScope::Product => target == Some(product.id.as_str()),
            RuleScope::Category => target == Some(product.category_id.as_str()),
            RuleScope::Manufacturer => target == Some(product.manufacturer_id.as_str()),
        }
    }

    fn admits(&self, customer: &Customer) -> bool {
        self.customer_tier.map_or(true, |tier| tier == customer.tier)
            && self.customer_type.map_or(true, |kind| kind == customer.customer_type)
            && self
                .customer_id
                .as_deref()
                .map_or(true, |id| id == customer.id)
    }

    fn matches(&self, line: &RuleContext<'_>) -> bool {
        is_active(self, line.as_of)
            && self.targets(line.product)
            && self.admits(line.customer)
            && self.quantity.contains(line.quantity)
    }
}

// =============================================================================
// Matcher
// =============================================================================

/// The line a rule is matched against.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub product: &'a Product,
    pub customer: &'a Customer,
    pub quantity: u32,
    pub as_of: DateTime<Utc>,
}

/// Result of rule matching.
#[derive(Debug, Clone)]
pub struct RuleOutcome<'a> {
    /// Discounted unit price, unrounded. Equals the input when no rule matched.
    pub price: Decimal,
    pub applied: Option<&'a DiscountRule>,
    pub ambiguity: Option<AmbiguousMatch>,
}

/// Selects and applies the single winning rule over an immutable snapshot.
#[derive(Debug, Clone, Copy)]
pub struct RuleMatcher<'a> {
    rules: &'a [DiscountRule],
}

impl<'a> RuleMatcher<'a> {
    pub fn new(rules: &'a [DiscountRule]) -> Self {
        RuleMatcher { rules }
    }

    /// All rules applicable to the line, in no particular order.
    pub fn candidates(&self, line: &RuleContext<'_>) -> Vec<&'a DiscountRule> {
        self.rules.iter().filter(|r| r.matches(line)).collect()
    }

    /// Applies the winning rule to `price`.
    pub fn apply(&self, line: &RuleContext<'_>, price: Decimal) -> RuleOutcome<'a> {
        let mut ranked: Vec<Ranked<'a>> = self
            .candidates(line)
            .into_iter()
            .map(|rule| Ranked {
                rule,
                result: rule.apply(price),
            })
            .collect();

        // Best first
        ranked.sort_by(|a, b| b.rank_cmp(a));

        let Some(winner) = ranked.first() else {
            return RuleOutcome {
                price,
                applied: None,
                ambiguity: None,
            };
        };

        let tied: Vec<&Ranked<'a>> = ranked
            .iter()
            .skip(1)
            .filter(|r| r.cmp_without_tie_break(winner) == Ordering::Equal)
            .collect();

        let ambiguity = (!tied.is_empty()).then(|| {
            let decided_by = if tied.iter().any(|r| r.rule.created_at == winner.rule.created_at) {
                TieBreak::Identifier
            } else {
                TieBreak::MostRecent
            };
            AmbiguousMatch {
                kind: MatchKind::Rule,
                winner_id: winner.rule.id.clone(),
                tied_with: tied.iter().map(|r| r.rule.id.clone()).collect(),
                decided_by,
            }
        });

        RuleOutcome {
            price: winner.result,
            applied: Some(winner.rule),
            ambiguity,
        }
    }
}

/// A candidate together with the price it would produce.
struct Ranked<'a> {
    rule: &'a DiscountRule,
    result: Decimal,
}

impl Ranked<'_> {
    /// Priority, specificity, then customer benefit (lower price is better).
    fn cmp_without_tie_break(&self, other: &Self) -> Ordering {
        self.rule
            .priority
            .cmp(&other.rule.priority)
            .then_with(|| self.rule.specificity().cmp(&other.rule.specificity()))
            .then_with(|| other.result.cmp(&self.result))
    }

    /// `Greater` means `self` should win.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.cmp_without_tie_break(other)
            .then_with(|| self.rule.created_at.cmp(&other.rule.created_at))
            .then_with(|| self.rule.id.cmp(&other.rule.id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
