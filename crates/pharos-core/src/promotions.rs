//! # Promotion Ledger
//!
//! Promotion codes: validation, discount computation and usage recording.
//!
//! ## Redemption Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  validate(code, customer, order amount, as_of)                          │
//! │    ├── NotFound / NotYetActive / Expired                                │
//! │    ├── UsageLimitReached / PerCustomerLimitReached                      │
//! │    ├── NotApplicableToCustomer                                          │
//! │    └── MinimumOrderNotMet                                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  check_product(promotion, product) ── NotApplicableToProduct            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  compute_discount(promotion, line)   capped by max_discount and line    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  record_usage(store, redemption)                                        │
//! │    UsageStore::try_record  ── conditional increment + ledger row,       │
//! │    │                          both or neither                           │
//! │    └── conflict? re-check counter, retry ONCE, else typed rejection     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The counter is protected by the store's conditional increment, never by
//! a lock held across the whole resolution.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PromotionRejection, UsageConflict};
use crate::types::{Customer, CustomerTier, CustomerType, Product};
use crate::validity::{Validity, ValidityWindow};

// =============================================================================
// Promotion Definition
// =============================================================================

/// Kind-specific discount formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    /// `line × value/100`
    Percentage,
    /// `value` off the line
    FixedAmount,
    /// No line discount; shipping is waived by the order subsystem.
    FreeShipping,
    /// Every `buy + get` units, `get` of them are free.
    BuyXGetY,
    /// No line discount; the gift item is added by the order subsystem.
    Gift,
    /// `value` off per complete bundle of `bundle_size` units.
    Bundle,
}

/// Who and what a promotion applies to. Empty lists and `None` mean "all".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromotionTarget {
    pub product_ids: Vec<String>,
    pub customer_ids: Vec<String>,
    pub customer_tier: Option<CustomerTier>,
    pub customer_type: Option<CustomerType>,
}

impl PromotionTarget {
    /// Targets every customer and every product.
    pub fn everyone() -> Self {
        PromotionTarget::default()
    }

    pub fn admits_customer(&self, customer: &Customer) -> bool {
        (self.customer_ids.is_empty() || self.customer_ids.iter().any(|id| *id == customer.id))
            && self.customer_tier.map_or(true, |tier| tier == customer.tier)
            && self
                .customer_type
                .map_or(true, |kind| kind == customer.customer_type)
    }

    pub fn admits_product(&self, product: &Product) -> bool {
        self.product_ids.is_empty() || self.product_ids.iter().any(|id| *id == product.id)
    }
}

/// A promotional code definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: String,
    /// Upper-case redemption code, unique.
    pub code: String,
    pub name: String,
    pub kind: PromotionKind,
    pub value: Decimal,
    pub buy_quantity: Option<u32>,
    pub get_quantity: Option<u32>,
    pub bundle_size: Option<u32>,
    pub min_order_amount: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    #[serde(flatten)]
    pub window: ValidityWindow,
    /// Total redemptions allowed. `None` = unlimited.
    pub usage_limit: Option<u32>,
    pub per_customer_limit: Option<u32>,
    /// Redemptions so far. Always equals the number of usage rows.
    pub usage_count: u32,
    pub target: PromotionTarget,
    pub stacks_with_promotions: bool,
    pub stacks_with_rules: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Validity for Promotion {
    fn enabled(&self) -> bool {
        self.is_active
    }

    fn window(&self) -> &ValidityWindow {
        &self.window
    }
}

impl Promotion {
    /// True when the total cap leaves no slot.
    pub fn is_exhausted(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.usage_count >= limit)
    }
}

/// Append-only ledger row for one successful redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionUsage {
    pub id: String,
    pub promotion_id: String,
    pub customer_id: String,
    pub order_id: String,
    pub discount_applied: Decimal,
    pub used_at: DateTime<Utc>,
}

/// A promotion as fetched for one customer: the definition plus how often
/// that customer already redeemed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionSnapshot {
    pub promotion: Promotion,
    pub customer_usage_count: u32,
}

/// The amount a promotion is computed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmount {
    pub unit_price: Decimal,
    pub quantity: u32,
}

impl LineAmount {
    pub fn total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

// =============================================================================
// Usage Store
// =============================================================================

/// What gets written when a promotion is redeemed.
#[derive(Debug, Clone, Copy)]
pub struct Redemption<'a> {
    pub promotion: &'a Promotion,
    pub customer_id: &'a str,
    pub order_id: &'a str,
    pub discount_applied: Decimal,
    pub used_at: DateTime<Utc>,
}

/// The data-store boundary that owns promotion usage counters.
///
/// `try_record` must perform the conditional increment and the ledger
/// append atomically: both or neither.
pub trait UsageStore {
    fn try_record(&self, redemption: &Redemption<'_>) -> Result<PromotionUsage, UsageConflict>;

    /// Current counter, `None` if the promotion is unknown to the store.
    fn usage_count(&self, promotion_id: &str) -> Option<u32>;

    fn customer_usage_count(&self, promotion_id: &str, customer_id: &str) -> u32;

    /// Undoes a recorded usage (counter and row together).
    fn revoke(&self, usage: &PromotionUsage);
}

// =============================================================================
// Ledger
// =============================================================================

/// Validation and redemption over an immutable snapshot of promotions.
#[derive(Debug, Clone, Copy)]
pub struct PromotionLedger<'a> {
    promotions: &'a [PromotionSnapshot],
}

impl<'a> PromotionLedger<'a> {
    pub fn new(promotions: &'a [PromotionSnapshot]) -> Self {
        PromotionLedger { promotions }
    }

    /// Looks up a code (case-insensitive).
    pub fn find(&self, code: &str) -> Option<&'a PromotionSnapshot> {
        let code = code.trim();
        self.promotions
            .iter()
            .find(|p| p.promotion.code.eq_ignore_ascii_case(code))
    }

    /// Checks whether `code` is usable by `customer` for an order of
    /// `order_amount` at `as_of`.
    ///
    /// ## Example
    /// ```rust,ignore
    /// match ledger.validate("FLU10", &customer, dec!(250), as_of) {
    ///     Ok(promotion) => { /* apply it */ }
    ///     Err(PromotionRejection::MinimumOrderNotMet) => { /* tell the rep */ }
    ///     Err(other) => { /* ... */ }
    /// }
    /// ```
    pub fn validate(
        &self,
        code: &str,
        customer: &Customer,
        order_amount: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<&'a Promotion, PromotionRejection> {
        let snapshot = self.find(code).ok_or(PromotionRejection::NotFound)?;
        let promotion = &snapshot.promotion;

        if !promotion.enabled() {
            return Err(PromotionRejection::NotFound);
        }
        if promotion.window.starts_after(as_of) {
            return Err(PromotionRejection::NotYetActive);
        }
        if promotion.window.ended_before(as_of) {
            return Err(PromotionRejection::Expired);
        }
        if promotion.is_exhausted() {
            return Err(PromotionRejection::UsageLimitReached);
        }
        if promotion
            .per_customer_limit
            .is_some_and(|limit| snapshot.customer_usage_count >= limit)
        {
            return Err(PromotionRejection::PerCustomerLimitReached);
        }
        if !promotion.target.admits_customer(customer) {
            return Err(PromotionRejection::NotApplicableToCustomer);
        }
        if promotion
            .min_order_amount
            .is_some_and(|minimum| order_amount < minimum)
        {
            return Err(PromotionRejection::MinimumOrderNotMet);
        }

        Ok(promotion)
    }

    /// Checks product targeting.
    pub fn check_product(
        promotion: &Promotion,
        product: &Product,
    ) -> Result<(), PromotionRejection> {
        if promotion.target.admits_product(product) {
            Ok(())
        } else {
            Err(PromotionRejection::NotApplicableToProduct)
        }
    }

    /// Line discount for `promotion`, unrounded.
    ///
    /// Capped by `max_discount` when set and never more than the line itself.
    pub fn compute_discount(promotion: &Promotion, line: LineAmount) -> Decimal {
        let line_total = line.total();
        let raw = match promotion.kind {
            PromotionKind::Percentage => line_total * promotion.value / Decimal::ONE_HUNDRED,
            PromotionKind::FixedAmount => promotion.value,
            PromotionKind::BuyXGetY => {
                let buy = promotion.buy_quantity.unwrap_or(1);
                let get = promotion.get_quantity.unwrap_or(0);
                match buy.checked_add(get).filter(|group| *group > 0) {
                    Some(group) => line.unit_price * Decimal::from((line.quantity / group) * get),
                    None => Decimal::ZERO,
                }
            }
            PromotionKind::Bundle => {
                let size = promotion.bundle_size.unwrap_or(1).max(1);
                promotion.value * Decimal::from(line.quantity / size)
            }
            PromotionKind::FreeShipping | PromotionKind::Gift => Decimal::ZERO,
        };

        let capped = promotion.max_discount.map_or(raw, |cap| raw.min(cap));
        capped.min(line_total).max(Decimal::ZERO)
    }

    /// Records a redemption through `store`, retrying once on a lost race.
    ///
    /// ## Race Handling
    /// ```text
    /// try_record ──ok──► usage row
    ///     │
    ///   conflict
    ///     │
    ///     ▼
    /// re-read counter ── still full? ──► UsageLimitReached / PerCustomerLimitReached
    ///     │
    ///   slot free (a competing order rolled back)
    ///     │
    ///     ▼
    /// try_record ──ok──► usage row
    ///     └──conflict──► typed rejection
    /// ```
    pub fn record_usage<S: UsageStore + ?Sized>(
        store: &S,
        redemption: &Redemption<'_>,
    ) -> Result<PromotionUsage, PromotionRejection> {
        let promotion = redemption.promotion;

        let first = match store.try_record(redemption) {
            Ok(usage) => return Ok(usage),
            Err(conflict) => conflict,
        };

        debug!(
            code = %promotion.code,
            order_id = %redemption.order_id,
            conflict = %first,
            "Promotion usage conflict, re-checking counter"
        );

        if !has_capacity(store, redemption) {
            return Err(first.into());
        }

        store.try_record(redemption).map_err(|second| {
            warn!(
                code = %promotion.code,
                order_id = %redemption.order_id,
                conflict = %second,
                "Promotion usage retry failed"
            );
            PromotionRejection::from(second)
        })
    }
}

fn has_capacity<S: UsageStore + ?Sized>(store: &S, redemption: &Redemption<'_>) -> bool {
    let promotion = redemption.promotion;
    let Some(total) = store.usage_count(&promotion.id) else {
        return false;
    };
    let customer = store.customer_usage_count(&promotion.id, redemption.customer_id);

    promotion.usage_limit.map_or(true, |limit| total < limit)
        && promotion
            .per_customer_limit
            .map_or(true, |limit| customer < limit)
}

// =============================================================================
// In-Memory Usage Store
// =============================================================================

/// Usage store for a single process.
///
/// The mutex is the store's own commit boundary, the in-memory counterpart
/// of the database's conditional `UPDATE`. It is held only for the
/// increment and append, never across a resolution.
#[derive(Debug, Default)]
pub struct InMemoryUsageStore {
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
struct LedgerState {
    counters: HashMap<String, u32>,
    per_customer: HashMap<(String, String), u32>,
    rows: Vec<PromotionUsage>,
}

impl InMemoryUsageStore {
    pub fn new() -> Self {
        InMemoryUsageStore::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes a promotion redeemable, seeding its counter from the definition.
    pub fn register(&self, promotion: &Promotion) {
        self.lock()
            .counters
            .entry(promotion.id.clone())
            .or_insert(promotion.usage_count);
    }

    /// Fresh snapshot of `promotion` for `customer_id`, with the store's counters.
    pub fn snapshot(&self, promotion: &Promotion, customer_id: &str) -> PromotionSnapshot {
        let state = self.lock();
        let mut promotion = promotion.clone();
        if let Some(count) = state.counters.get(&promotion.id) {
            promotion.usage_count = *count;
        }
        let customer_usage_count = state
            .per_customer
            .get(&(promotion.id.clone(), customer_id.to_string()))
            .copied()
            .unwrap_or(0);

        PromotionSnapshot {
            promotion,
            customer_usage_count,
        }
    }

    /// All rows recorded for a promotion, oldest first.
    pub fn usages(&self, promotion_id: &str) -> Vec<PromotionUsage> {
        self.lock()
            .rows
            .iter()
            .filter(|u| u.promotion_id == promotion_id)
            .cloned()
            .collect()
    }

    /// Revokes every usage recorded for an aborted order.
    pub fn rollback_order(&self, order_id: &str) -> usize {
        let doomed: Vec<PromotionUsage> = self
            .lock()
            .rows
            .iter()
            .filter(|u| u.order_id == order_id)
            .cloned()
            .collect();

        for usage in &doomed {
            self.revoke(usage);
        }
        doomed.len()
    }
}

impl UsageStore for InMemoryUsageStore {
    fn try_record(&self, redemption: &Redemption<'_>) -> Result<PromotionUsage, UsageConflict> {
        let promotion = redemption.promotion;
        let customer_key = (promotion.id.clone(), redemption.customer_id.to_string());

        let mut state = self.lock();
        let total = *state
            .counters
            .get(&promotion.id)
            .ok_or(UsageConflict::Missing)?;
        if promotion.usage_limit.is_some_and(|limit| total >= limit) {
            return Err(UsageConflict::TotalCapReached);
        }
        let customer = state.per_customer.get(&customer_key).copied().unwrap_or(0);
        if promotion.per_customer_limit.is_some_and(|limit| customer >= limit) {
            return Err(UsageConflict::CustomerCapReached);
        }

        let usage = PromotionUsage {
            id: Uuid::new_v4().to_string(),
            promotion_id: promotion.id.clone(),
            customer_id: redemption.customer_id.to_string(),
            order_id: redemption.order_id.to_string(),
            discount_applied: redemption.discount_applied,
            used_at: redemption.used_at,
        };

        state.counters.insert(promotion.id.clone(), total + 1);
        state.per_customer.insert(customer_key, customer + 1);
        state.rows.push(usage.clone());

        Ok(usage)
    }

    fn usage_count(&self, promotion_id: &str) -> Option<u32> {
        self.lock().counters.get(promotion_id).copied()
    }

    fn customer_usage_count(&self, promotion_id: &str, customer_id: &str) -> u32 {
        self.lock()
            .per_customer
            .get(&(promotion_id.to_string(), customer_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn revoke(&self, usage: &PromotionUsage) {
        let mut state = self.lock();
        let Some(position) = state.rows.iter().position(|u| u.id == usage.id) else {
            return;
        };
        state.rows.remove(position);

        if let Some(count) = state.counters.get_mut(&usage.promotion_id) {
            *count = count.saturating_sub(1);
        }
        let key = (usage.promotion_id.clone(), usage.customer_id.clone());
        if let Some(count) = state.per_customer.get_mut(&key) {
            *count = count.saturating_sub(1);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::thread;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, day, 10, 0, 0).unwrap()
    }

    fn customer() -> Customer {
        Customer {
            id: "hospital-3".to_string(),
            name: "St. Mary".to_string(),
            tier: CustomerTier::Standard,
            customer_type: CustomerType::Hospital,
            region_id: None,
        }
    }

    fn product() -> Product {
        Product {
            id: "insulin-pen".to_string(),
            name: "Insulin pen".to_string(),
            unit_price: dec!(25),
            tax_rate_bps: 0,
            category_id: "diabetes".to_string(),
            manufacturer_id: "novo".to_string(),
            is_active: true,
        }
    }

    fn promo(kind: PromotionKind, value: Decimal) -> Promotion {
        Promotion {
            id: "promo-1".to_string(),
            code: "WINTER".to_string(),
            name: "Winter campaign".to_string(),
            kind,
            value,
            buy_quantity: None,
            get_quantity: None,
            bundle_size: None,
            min_order_amount: None,
            max_discount: None,
            window: ValidityWindow::between(at(1), at(20)),
            usage_limit: None,
            per_customer_limit: None,
            usage_count: 0,
            target: PromotionTarget::everyone(),
            stacks_with_promotions: false,
            stacks_with_rules: true,
            is_active: true,
            created_at: at(1),
        }
    }

    fn snap(promotion: Promotion, customer_usage_count: u32) -> Vec<PromotionSnapshot> {
        vec![PromotionSnapshot {
            promotion,
            customer_usage_count,
        }]
    }

    fn validate(
        snapshots: &[PromotionSnapshot],
        amount: Decimal,
        day: u32,
    ) -> Result<&Promotion, PromotionRejection> {
        PromotionLedger::new(snapshots).validate("winter", &customer(), amount, at(day))
    }

    /// Why `promotion` is refused on day 5 for an order of `amount`.
    fn refusal(promotion: Promotion, customer_uses: u32, amount: Decimal) -> PromotionRejection {
        validate(&snap(promotion, customer_uses), amount, 5).unwrap_err()
    }

    fn discount(promotion: &Promotion, line: LineAmount) -> Decimal {
        PromotionLedger::compute_discount(promotion, line)
    }

    #[test]
    fn test_validate_ok() {
        let snapshots = snap(promo(PromotionKind::Percentage, dec!(10)), 0);
        assert_eq!(validate(&snapshots, dec!(100), 5).unwrap().code, "WINTER");
    }

    #[test]
    fn test_rejections() {
        let snapshots = snap(promo(PromotionKind::Percentage, dec!(10)), 0);
        assert_eq!(
            PromotionLedger::new(&snapshots)
                .validate("SUMMER", &customer(), dec!(100), at(5))
                .unwrap_err(),
            PromotionRejection::NotFound
        );

        let mut early = promo(PromotionKind::Percentage, dec!(10));
        early.window = ValidityWindow::between(at(10), at(20));
        assert_eq!(refusal(early, 0, dec!(100)), PromotionRejection::NotYetActive);

        assert_eq!(validate(&snapshots, dec!(100), 25).unwrap_err(), PromotionRejection::Expired);

        let mut exhausted = promo(PromotionKind::Percentage, dec!(10));
        exhausted.usage_limit = Some(3);
        exhausted.usage_count = 3;
        assert_eq!(refusal(exhausted, 0, dec!(100)), PromotionRejection::UsageLimitReached);

        let mut once = promo(PromotionKind::Percentage, dec!(10));
        once.per_customer_limit = Some(1);
        assert_eq!(refusal(once, 1, dec!(100)), PromotionRejection::PerCustomerLimitReached);

        let mut pharmacies = promo(PromotionKind::Percentage, dec!(10));
        pharmacies.target.customer_type = Some(CustomerType::Pharmacy);
        assert_eq!(refusal(pharmacies, 0, dec!(100)), PromotionRejection::NotApplicableToCustomer);

        let mut big_orders = promo(PromotionKind::Percentage, dec!(10));
        big_orders.min_order_amount = Some(dec!(500));
        assert_eq!(refusal(big_orders, 0, dec!(499.99)), PromotionRejection::MinimumOrderNotMet);

        let mut disabled = promo(PromotionKind::Percentage, dec!(10));
        disabled.is_active = false;
        assert_eq!(refusal(disabled, 0, dec!(100)), PromotionRejection::NotFound);
    }

    #[test]
    fn test_product_targeting() {
        let mut targeted = promo(PromotionKind::Percentage, dec!(10));
        targeted.target.product_ids = vec!["other".to_string()];
        assert_eq!(
            PromotionLedger::check_product(&targeted, &product()).unwrap_err(),
            PromotionRejection::NotApplicableToProduct
        );

        targeted.target.product_ids.push("insulin-pen".to_string());
        assert!(PromotionLedger::check_product(&targeted, &product()).is_ok());
    }

    #[test]
    fn test_compute_discount_by_kind() {
        let line = LineAmount {
            unit_price: dec!(25),
            quantity: 7,
        };

        assert_eq!(discount(&promo(PromotionKind::Percentage, dec!(10)), line), dec!(17.5));
        assert_eq!(discount(&promo(PromotionKind::FixedAmount, dec!(30)), line), dec!(30));
        assert_eq!(discount(&promo(PromotionKind::FreeShipping, dec!(0)), line), dec!(0));
        assert_eq!(discount(&promo(PromotionKind::Gift, dec!(0)), line), dec!(0));

        let mut bogo = promo(PromotionKind::BuyXGetY, dec!(0));
        bogo.buy_quantity = Some(2);
        bogo.get_quantity = Some(1);
        // 7 units = two complete groups of 3 → 2 free
        assert_eq!(PromotionLedger::compute_discount(&bogo, line), dec!(50));

        let mut bundle = promo(PromotionKind::Bundle, dec!(4));
        bundle.bundle_size = Some(3);
        assert_eq!(PromotionLedger::compute_discount(&bundle, line), dec!(8));
    }

    #[test]
    fn test_compute_discount_caps() {
        let line = LineAmount {
            unit_price: dec!(25),
            quantity: 2,
        };

        let mut capped = promo(PromotionKind::Percentage, dec!(50));
        capped.max_discount = Some(dec!(10));
        assert_eq!(PromotionLedger::compute_discount(&capped, line), dec!(10));

        // Never more than the line
        assert_eq!(discount(&promo(PromotionKind::FixedAmount, dec!(80)), line), dec!(50));
    }

    fn redemption<'a>(promotion: &'a Promotion, order_id: &'a str) -> Redemption<'a> {
        Redemption {
            promotion,
            customer_id: "hospital-3",
            order_id,
            discount_applied: dec!(2.50),
            used_at: at(5),
        }
    }

    #[test]
    fn test_record_usage_respects_cap() {
        let mut capped = promo(PromotionKind::Percentage, dec!(10));
        capped.usage_limit = Some(1);
        let store = InMemoryUsageStore::new();
        store.register(&capped);

        let usage = PromotionLedger::record_usage(&store, &redemption(&capped, "order-1")).unwrap();
        assert_eq!(usage.order_id, "order-1");
        assert_eq!(store.usage_count(&capped.id), Some(1));

        let err =
            PromotionLedger::record_usage(&store, &redemption(&capped, "order-2")).unwrap_err();
        assert_eq!(err, PromotionRejection::UsageLimitReached);
        assert_eq!(store.usages(&capped.id).len(), 1);
    }

    #[test]
    fn test_record_usage_per_customer_cap() {
        let mut once = promo(PromotionKind::Percentage, dec!(10));
        once.per_customer_limit = Some(1);
        let store = InMemoryUsageStore::new();
        store.register(&once);

        PromotionLedger::record_usage(&store, &redemption(&once, "order-1")).unwrap();
        let err = PromotionLedger::record_usage(&store, &redemption(&once, "order-2")).unwrap_err();
        assert_eq!(err, PromotionRejection::PerCustomerLimitReached);
        assert_eq!(store.snapshot(&once, "hospital-3").customer_usage_count, 1);
    }

    #[test]
    fn test_unregistered_promotion_is_not_found() {
        let store = InMemoryUsageStore::new();
        let unknown = promo(PromotionKind::Percentage, dec!(10));
        let err =
            PromotionLedger::record_usage(&store, &redemption(&unknown, "order-1")).unwrap_err();
        assert_eq!(err, PromotionRejection::NotFound);
    }

    #[test]
    fn test_rollback_frees_the_slot() {
        let mut capped = promo(PromotionKind::Percentage, dec!(10));
        capped.usage_limit = Some(1);
        let store = InMemoryUsageStore::new();
        store.register(&capped);

        PromotionLedger::record_usage(&store, &redemption(&capped, "order-1")).unwrap();
        assert_eq!(store.rollback_order("order-1"), 1);
        assert_eq!(store.usage_count(&capped.id), Some(0));
        assert!(store.usages(&capped.id).is_empty());

        assert!(PromotionLedger::record_usage(&store, &redemption(&capped, "order-2")).is_ok());
    }

    #[test]
    fn test_concurrent_last_slot_single_winner() {
        let mut capped = promo(PromotionKind::Percentage, dec!(10));
        capped.usage_limit = Some(1);
        let store = Arc::new(InMemoryUsageStore::new());
        store.register(&capped);
        let capped = Arc::new(capped);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let capped = Arc::clone(&capped);
                thread::spawn(move || {
                    let order_id = format!("order-{i}");
                    PromotionLedger::record_usage(store.as_ref(), &redemption(&capped, &order_id))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == PromotionRejection::UsageLimitReached));
        assert_eq!(store.usages(&capped.id).len(), 1);
        assert_eq!(store.usage_count(&capped.id), Some(1));
    }
}
