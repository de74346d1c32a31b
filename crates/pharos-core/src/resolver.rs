//! # Price Resolver
//!
//! Collapses overrides, rules and promotion codes into one priced line.
//!
//! ## Resolution Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  PriceRequest + PricingSnapshot (eagerly fetched, immutable)            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  0. validate     unknown product/customer, inactive product, quantity   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  1. override     PriceOverrideStore  → base (or Product.unit_price)     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. rule         RuleMatcher         → exactly one rule, or none        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  3. promotions   PromotionLedger     → validate every code first        │
//! │       │            stacks_with_rules = false  → replaces step 2         │
//! │       │            otherwise                  → on top of step 2        │
//! │       ▼                                                                 │
//! │  4. clamp        ≥ 0                                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  5. tax + round  RoundingPolicy (only here; all steps above are exact)  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  PricedLine { unit price, adjustments, tax, totals, warnings }          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution never touches a data store. Recording promotion usage is a
//! separate step ([`PriceResolver::resolve_and_redeem`]) that goes through a
//! [`UsageStore`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::audit::{AdjustmentSource, AmbiguousMatch, PriceAdjustment};
use crate::error::{CoreResult, PricingError, PromotionRejection, ValidationError};
use crate::money::Money;
use crate::overrides::{OverrideQuery, PriceOverride, PriceOverrideStore};
use crate::promotions::{
    LineAmount, Promotion, PromotionKind, PromotionLedger, PromotionSnapshot, PromotionUsage,
    Redemption, UsageStore,
};
use crate::rounding::RoundingPolicy;
use crate::rules::{DiscountRule, RuleContext, RuleMatcher};
use crate::types::{Customer, PriceCategory, Product};
use crate::validation::{
    normalize_code, validate_price, validate_promotion_amounts, validate_quantity,
    validate_rule_value,
};
use crate::{MAX_AMOUNT, MAX_LINE_QUANTITY};

// =============================================================================
// Inputs
// =============================================================================

/// Everything one resolution may look at, fetched before it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub product: Product,
    pub customer: Customer,
    pub overrides: Vec<PriceOverride>,
    pub rules: Vec<DiscountRule>,
    pub promotions: Vec<PromotionSnapshot>,
}

/// `ResolvePrice(productId, customerId, quantity, asOfDate, promotionCode?)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRequest {
    pub product_id: String,
    pub customer_id: String,
    pub quantity: u32,
    pub as_of: DateTime<Utc>,
    #[serde(default)]
    pub price_category: PriceCategory,
    /// Applied in order. More than one needs every promotion to stack.
    #[serde(default)]
    pub promotion_codes: Vec<String>,
    /// Order subtotal used for minimum-order checks. Defaults to this line.
    #[serde(default)]
    pub order_amount: Option<Decimal>,
}

impl PriceRequest {
    pub fn new(
        product_id: impl Into<String>,
        customer_id: impl Into<String>,
        quantity: u32,
        as_of: DateTime<Utc>,
    ) -> Self {
        PriceRequest {
            product_id: product_id.into(),
            customer_id: customer_id.into(),
            quantity,
            as_of,
            price_category: PriceCategory::default(),
            promotion_codes: Vec::new(),
            order_amount: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.promotion_codes.push(code.into());
        self
    }

    pub fn with_category(mut self, category: PriceCategory) -> Self {
        self.price_category = category;
        self
    }

    pub fn with_order_amount(mut self, amount: Decimal) -> Self {
        self.order_amount = Some(amount);
        self
    }
}

// =============================================================================
// Output
// =============================================================================

/// A promotion that contributed to the line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub promotion_id: String,
    pub code: String,
    pub kind: PromotionKind,
    /// Discount on the whole line, rounded.
    pub line_discount: Money,
}

/// The auditable result of one resolution.
///
/// `base_price - Σ adjustments == unit_price` within rounding tolerance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub customer_id: String,
    pub quantity: u32,
    /// Catalog list price.
    pub base_price: Money,
    /// Final per-unit price, never negative.
    pub unit_price: Money,
    /// Ordered contributions: override, rule, promotions, clamp.
    pub adjustments: Vec<PriceAdjustment>,
    /// Rule that matched but was replaced by a non-stacking promotion.
    pub superseded_rule_id: Option<String>,
    pub applied_promotions: Vec<AppliedPromotion>,
    pub tax_rate_bps: u32,
    pub tax_amount: Money,
    /// `unit_price × quantity` before tax.
    pub line_total: Money,
    /// `line_total + tax_amount`
    pub gross_total: Money,
    pub warnings: Vec<AmbiguousMatch>,
}

impl PricedLine {
    /// Sum of all contributions.
    pub fn total_adjustment(&self) -> Money {
        self.adjustments
            .iter()
            .fold(Money::zero(), |acc, adj| acc + adj.amount)
    }
}

/// A priced line together with the usage rows written for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemedLine {
    pub line: PricedLine,
    pub usages: Vec<PromotionUsage>,
}

// =============================================================================
// Resolver
// =============================================================================

/// Synchronous, side-effect-free price resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceResolver {
    policy: RoundingPolicy,
}

impl PriceResolver {
    pub fn new(policy: RoundingPolicy) -> Self {
        PriceResolver { policy }
    }

    pub fn policy(&self) -> RoundingPolicy {
        self.policy
    }

    /// Resolves one line against `snapshot`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let request = PriceRequest::new("ibuprofen-400", "pharmacy-1", 20, as_of)
    ///     .with_code("FLU10");
    /// match resolver.resolve(&snapshot, &request) {
    ///     Ok(line) => println!("{} x {} = {}", line.quantity, line.unit_price, line.line_total),
    ///     Err(PricingError::Rejected { code, reason }) => { /* re-resolve without `code` */ }
    ///     Err(PricingError::Validation(e)) => { /* bad request */ }
    /// }
    /// ```
    pub fn resolve(
        &self,
        snapshot: &PricingSnapshot,
        request: &PriceRequest,
    ) -> CoreResult<PricedLine> {
        check_request(snapshot, request)?;

        let product = &snapshot.product;
        let customer = &snapshot.customer;
        let quantity = request.quantity;
        let mut adjustments: Vec<Pending> = Vec::new();
        let mut warnings: Vec<AmbiguousMatch> = Vec::new();

        // 1. Override
        let base = product.unit_price;
        let query = OverrideQuery {
            product_id: &product.id,
            price_category: request.price_category,
            customer_id: Some(&customer.id),
            region_id: customer.region_id.as_deref(),
            as_of: request.as_of,
        };
        let overridden = match PriceOverrideStore::new(&snapshot.overrides).lookup(&query) {
            Some(found) => {
                adjustments.push(Pending::new(
                    AdjustmentSource::Override,
                    Some(found.winner.id.clone()),
                    base - found.winner.unit_price,
                ));
                warnings.extend(found.ambiguity);
                found.winner.unit_price
            }
            None => base,
        };

        // 2. Rule
        let context = RuleContext {
            product,
            customer,
            quantity,
            as_of: request.as_of,
        };
        let rule = RuleMatcher::new(&snapshot.rules).apply(&context, overridden);
        warnings.extend(rule.ambiguity.clone());

        // 3. Promotions: every code is validated before any is applied.
        // Minimums are checked against the price the line will charge.
        let replaces_rule = rule.applied.is_some() && supersedes_rule(snapshot, request);
        let charged = if replaces_rule { overridden } else { rule.price };
        let charged_line = extend(charged, quantity)?;
        let order_amount = request.order_amount.unwrap_or(charged_line);
        let promotions = self.validate_codes(snapshot, request, order_amount)?;

        let mut superseded_rule_id = None;
        let mut price = match rule.applied {
            Some(applied) if replaces_rule => {
                superseded_rule_id = Some(applied.id.clone());
                overridden
            }
            Some(applied) => {
                adjustments.push(Pending::new(
                    AdjustmentSource::Rule,
                    Some(applied.id.clone()),
                    overridden - rule.price,
                ));
                rule.price
            }
            None => overridden,
        };

        let mut applied_promotions = Vec::with_capacity(promotions.len());
        for promotion in promotions {
            let line_discount = PromotionLedger::compute_discount(
                promotion,
                LineAmount {
                    unit_price: price,
                    quantity,
                },
            );
            let per_unit = line_discount / Decimal::from(quantity);
            adjustments.push(Pending::new(
                AdjustmentSource::Promotion,
                Some(promotion.code.clone()),
                per_unit,
            ));
            applied_promotions.push(AppliedPromotion {
                promotion_id: promotion.id.clone(),
                code: promotion.code.clone(),
                kind: promotion.kind,
                line_discount: self.policy.money(line_discount),
            });
            price -= per_unit;
        }

        // 4. Clamp
        if price < Decimal::ZERO {
            adjustments.push(Pending::new(AdjustmentSource::Clamp, None, price));
            price = Decimal::ZERO;
        }

        // 5. Tax and rounding
        let exact_line = extend(price, quantity)?;
        let tax_rate = product.tax_rate();
        let line_total = self.policy.money(exact_line);
        let tax_amount = self.policy.money(tax_rate.apply(exact_line));

        for warning in &warnings {
            warning.log(&product.id);
        }

        let line = PricedLine {
            product_id: product.id.clone(),
            customer_id: customer.id.clone(),
            quantity,
            base_price: self.policy.money(base),
            unit_price: self.policy.money(price),
            adjustments: adjustments
                .into_iter()
                .map(|pending| pending.round(&self.policy))
                .collect(),
            superseded_rule_id,
            applied_promotions,
            tax_rate_bps: tax_rate.bps(),
            tax_amount,
            line_total,
            gross_total: line_total + tax_amount,
            warnings,
        };

        debug!(
            product_id = %line.product_id,
            customer_id = %line.customer_id,
            quantity = line.quantity,
            unit_price = %line.unit_price,
            line_total = %line.line_total,
            "Resolved price"
        );

        Ok(line)
    }

    /// Resolves the line and records usage of every applied promotion.
    ///
    /// If a later code loses the race for its last slot, usages already
    /// recorded for this call are revoked and the rejection is returned; the
    /// caller re-resolves without that code.
    ///
    /// ## User Workflow
    /// ```text
    /// resolve_and_redeem(codes: ["A", "B"])
    ///      │
    ///      ├── resolve()            → PricedLine (pure)
    ///      ├── record_usage("A")    → ok
    ///      ├── record_usage("B")    → UsageLimitReached
    ///      │       └── revoke("A")
    ///      ▼
    /// Err(Rejected { code: "B", reason: UsageLimitReached })
    /// ```
    pub fn resolve_and_redeem<S: UsageStore + ?Sized>(
        &self,
        snapshot: &PricingSnapshot,
        request: &PriceRequest,
        order_id: &str,
        store: &S,
    ) -> CoreResult<RedeemedLine> {
        let line = self.resolve(snapshot, request)?;

        let mut usages: Vec<PromotionUsage> = Vec::with_capacity(line.applied_promotions.len());
        for applied in &line.applied_promotions {
            let recorded = snapshot
                .promotions
                .iter()
                .map(|s| &s.promotion)
                .find(|p| p.id == applied.promotion_id)
                .ok_or(PromotionRejection::NotFound)
                .and_then(|promotion| {
                    let redemption = Redemption {
                        promotion,
                        customer_id: &line.customer_id,
                        order_id,
                        discount_applied: applied.line_discount.amount(),
                        used_at: request.as_of,
                    };
                    PromotionLedger::record_usage(store, &redemption)
                });

            match recorded {
                Ok(usage) => usages.push(usage),
                Err(reason) => {
                    for usage in &usages {
                        store.revoke(usage);
                    }
                    return Err(PricingError::rejected(applied.code.clone(), reason));
                }
            }
        }

        Ok(RedeemedLine { line, usages })
    }

    /// Validates every requested code and enforces the stacking policy.
    fn validate_codes<'s>(
        &self,
        snapshot: &'s PricingSnapshot,
        request: &PriceRequest,
        order_amount: Decimal,
    ) -> CoreResult<Vec<&'s Promotion>> {
        let ledger = PromotionLedger::new(&snapshot.promotions);
        let mut seen = HashSet::new();
        let mut accepted: Vec<&'s Promotion> = Vec::with_capacity(request.promotion_codes.len());

        for raw in &request.promotion_codes {
            let code = normalize_code(raw);
            if !seen.insert(code.clone()) {
                return Err(PricingError::rejected(code, PromotionRejection::DuplicateCode));
            }

            let promotion = ledger
                .validate(&code, &snapshot.customer, order_amount, request.as_of)
                .and_then(|p| PromotionLedger::check_product(p, &snapshot.product).map(|()| p))
                .map_err(|reason| PricingError::rejected(code.clone(), reason))?;

            let stacks = accepted.is_empty()
                || (promotion.stacks_with_promotions
                    && accepted.iter().all(|p| p.stacks_with_promotions));
            if !stacks {
                return Err(PricingError::rejected(code, PromotionRejection::StackingNotAllowed));
            }

            accepted.push(promotion);
        }

        Ok(accepted)
    }
}

/// Rejects requests the snapshot cannot answer.
fn check_request(
    snapshot: &PricingSnapshot,
    request: &PriceRequest,
) -> Result<(), ValidationError> {
    if snapshot.product.id != request.product_id {
        return Err(ValidationError::unknown("product", &request.product_id));
    }
    if snapshot.customer.id != request.customer_id {
        return Err(ValidationError::unknown("customer", &request.customer_id));
    }
    if !snapshot.product.is_active {
        return Err(ValidationError::Inactive {
            entity: "product".to_string(),
            id: snapshot.product.id.clone(),
        });
    }
    validate_quantity(request.quantity)?;
    validate_price("unit_price", snapshot.product.unit_price)?;
    for ovr in &snapshot.overrides {
        validate_price("unit_price", ovr.unit_price)?;
    }
    for rule in &snapshot.rules {
        validate_rule_value(rule)?;
    }
    for found in &snapshot.promotions {
        validate_promotion_amounts(&found.promotion)?;
    }
    if let Some(amount) = request.order_amount {
        validate_price("order_amount", amount)?;
    }
    Ok(())
}

/// Whether any requested code asks to replace the rule discount.
fn supersedes_rule(snapshot: &PricingSnapshot, request: &PriceRequest) -> bool {
    let ledger = PromotionLedger::new(&snapshot.promotions);
    request
        .promotion_codes
        .iter()
        .filter_map(|raw| ledger.find(&normalize_code(raw)))
        .any(|found| !found.promotion.stacks_with_rules)
}

/// `unit_price * quantity`, refusing amounts outside `Decimal` range.
fn extend(unit_price: Decimal, quantity: u32) -> Result<Decimal, ValidationError> {
    unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "line_total".to_string(),
            min: 0,
            max: MAX_AMOUNT.saturating_mul(i64::from(MAX_LINE_QUANTITY)),
        })
}

/// An adjustment with its exact amount, rounded only when the line is built.
struct Pending {
    source: AdjustmentSource,
    reference: Option<String>,
    amount: Decimal,
}

impl Pending {
    fn new(source: AdjustmentSource, reference: Option<String>, amount: Decimal) -> Self {
        Pending {
            source,
            reference,
            amount,
        }
    }

    fn round(self, policy: &RoundingPolicy) -> PriceAdjustment {
        PriceAdjustment {
            source: self.source,
            reference: self.reference,
            amount: policy.money(self.amount),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
