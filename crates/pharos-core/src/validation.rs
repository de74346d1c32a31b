//! # Validation Module
//!
//! Input validation for pricing requests and administrative definitions.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Administrative tooling                                        │
//! │  └── validate_override / validate_rule / validate_promotion             │
//! │      before any INSERT or UPDATE                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: PriceResolver                                                 │
//! │  └── validate_quantity, snapshot identity checks                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── CHECK constraints (non-negative prices, counters)                  │
//! │  ├── UNIQUE constraints (promotion code)                                │
//! │  └── Foreign key constraints                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pharos_core::validation::{validate_promotion_code, validate_quantity};
//!
//! validate_promotion_code("FLU-10").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::overrides::PriceOverride;
use crate::promotions::{Promotion, PromotionKind};
use crate::rules::{DiscountKind, DiscountRule, QuantityRange, RuleScope};
use crate::types::Product;
use crate::validity::ValidityWindow;
use crate::{MAX_AMOUNT, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted id or promotion code.
const MAX_ID_LEN: usize = 64;
const MAX_CODE_LEN: usize = 32;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an entity id: non-empty, at most 64 characters.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("must be at most {MAX_ID_LEN} characters"),
        });
    }

    Ok(())
}

/// Validates a promotion code as stored.
///
/// ## Rules
/// - Must not be empty
/// - At most 32 characters
/// - Only upper-case letters, digits, hyphens, underscores
///
/// ## Example
/// ```rust
/// use pharos_core::validation::validate_promotion_code;
///
/// assert!(validate_promotion_code("WINTER-24").is_ok());
/// assert!(validate_promotion_code("winter").is_err());
/// assert!(validate_promotion_code("").is_err());
/// ```
pub fn validate_promotion_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > MAX_CODE_LEN {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: format!("must be at most {MAX_CODE_LEN} characters"),
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only upper-case letters, digits, hyphens, and underscores"
                .to_string(),
        });
    }

    Ok(())
}

/// Canonical form of a code typed by a user: trimmed, upper-case.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## User Workflow
/// ```text
/// ResolvePrice(quantity: 0)
///      │
///      ▼
/// validate_quantity(0) ← THIS FUNCTION
///      │
///      ├── qty == 0?        → MustBePositive
///      ├── qty > 100 000?   → OutOfRange
///      └── OK → resolution continues
/// ```
pub fn validate_quantity(qty: u32) -> ValidationResult<()> {
    if qty == 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: i64::from(MAX_LINE_QUANTITY),
        });
    }

    Ok(())
}

/// Validates a monetary amount. Zero is allowed (free goods).
pub fn validate_price(field: &str, amount: Decimal) -> ValidationResult<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    if amount > Decimal::from(MAX_AMOUNT) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT,
        });
    }

    Ok(())
}

/// Validates a percentage between 0 and 100 inclusive.
pub fn validate_percentage(field: &str, value: Decimal) -> ValidationResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: 100,
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0 to 10000).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

/// A cap of zero is never meaningful; `None` means unlimited.
fn validate_cap(field: &str, cap: Option<u32>) -> ValidationResult<()> {
    if cap == Some(0) {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Range Validators
// =============================================================================

pub fn validate_window(field: &str, window: &ValidityWindow) -> ValidationResult<()> {
    if !window.is_well_formed() {
        return Err(ValidationError::InvalidWindow {
            field: field.to_string(),
        });
    }

    Ok(())
}

pub fn validate_quantity_range(range: &QuantityRange) -> ValidationResult<()> {
    if let (Some(min), Some(max)) = (range.min_quantity, range.max_quantity) {
        if min > max {
            return Err(ValidationError::InvalidWindow {
                field: "quantity range".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Definition Validators
// =============================================================================

pub fn validate_product(product: &Product) -> ValidationResult<()> {
    validate_id("product id", &product.id)?;
    if product.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }
    validate_price("unit_price", product.unit_price)?;
    validate_tax_rate_bps(product.tax_rate_bps)
}

pub fn validate_override(ovr: &PriceOverride) -> ValidationResult<()> {
    validate_id("override id", &ovr.id)?;
    validate_id("product id", &ovr.product_id)?;
    validate_price("unit_price", ovr.unit_price)?;
    validate_window("validity window", &ovr.window)
}

/// Checks a discount rule before it is stored.
///
/// ## Rules
/// - Non-global scopes need a target id
/// - Percentage values lie in 0..=100, other values are non-negative
/// - Quantity range and validity window are ordered
pub fn validate_rule(rule: &DiscountRule) -> ValidationResult<()> {
    validate_id("rule id", &rule.id)?;

    if rule.scope != RuleScope::Global
        && rule.target_id.as_deref().map_or(true, |t| t.trim().is_empty())
    {
        return Err(ValidationError::Required {
            field: "target_id".to_string(),
        });
    }

    validate_rule_value(rule)?;
    validate_quantity_range(&rule.quantity)?;
    validate_window("validity window", &rule.window)
}

/// Percentage rules stay in 0..=100, amounts and fixed prices in 0..=MAX_AMOUNT.
pub fn validate_rule_value(rule: &DiscountRule) -> ValidationResult<()> {
    match rule.kind {
        DiscountKind::Percentage => validate_percentage("value", rule.value),
        DiscountKind::FixedAmount | DiscountKind::FixedPrice => validate_price("value", rule.value),
    }
}

/// The monetary fields of a promotion: value, minimum order and cap.
pub fn validate_promotion_amounts(promotion: &Promotion) -> ValidationResult<()> {
    match promotion.kind {
        PromotionKind::Percentage => validate_percentage("value", promotion.value)?,
        PromotionKind::FixedAmount | PromotionKind::Bundle => {
            validate_price("value", promotion.value)?
        }
        _ => {}
    }

    if let Some(minimum) = promotion.min_order_amount {
        validate_price("min_order_amount", minimum)?;
    }
    if let Some(cap) = promotion.max_discount {
        validate_price("max_discount", cap)?;
    }

    Ok(())
}

/// Checks a promotion before it is stored.
pub fn validate_promotion(promotion: &Promotion) -> ValidationResult<()> {
    validate_id("promotion id", &promotion.id)?;
    validate_promotion_code(&promotion.code)?;

    if promotion.name.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    validate_promotion_amounts(promotion)?;

    if promotion.kind == PromotionKind::BuyXGetY {
        for (field, quantity) in [
            ("buy_quantity", promotion.buy_quantity),
            ("get_quantity", promotion.get_quantity),
        ] {
            if quantity.unwrap_or(0) == 0 {
                return Err(ValidationError::MustBePositive {
                    field: field.to_string(),
                });
            }
        }
    }

    if promotion.kind == PromotionKind::Bundle && promotion.bundle_size.unwrap_or(0) == 0 {
        return Err(ValidationError::MustBePositive {
            field: "bundle_size".to_string(),
        });
    }

    validate_cap("usage_limit", promotion.usage_limit)?;
    validate_cap("per_customer_limit", promotion.per_customer_limit)?;
    validate_window("validity window", &promotion.window)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::promotions::PromotionTarget;
    use crate::types::PriceCategory;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_validate_promotion_code() {
        assert!(validate_promotion_code("FLU10").is_ok());
        assert!(validate_promotion_code("WINTER_24-B").is_ok());

        assert!(validate_promotion_code("").is_err());
        assert!(validate_promotion_code("   ").is_err());
        assert!(validate_promotion_code("flu10").is_err());
        assert!(validate_promotion_code("HAS SPACE").is_err());
        assert!(validate_promotion_code(&"A".repeat(40)).is_err());
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  flu10 "), "FLU10");
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_LINE_QUANTITY).is_ok());

        assert!(matches!(
            validate_quantity(0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(matches!(
            validate_quantity(MAX_LINE_QUANTITY + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_price_and_percentage() {
        assert!(validate_price("price", dec!(0)).is_ok());
        assert!(validate_price("price", dec!(10.99)).is_ok());
        assert!(validate_price("price", dec!(-0.01)).is_err());
        assert!(validate_price("price", Decimal::from(MAX_AMOUNT)).is_ok());
        assert!(matches!(
            validate_price("price", Decimal::MAX / dec!(2)),
            Err(ValidationError::OutOfRange { .. })
        ));

        assert!(validate_percentage("value", dec!(0)).is_ok());
        assert!(validate_percentage("value", dec!(100)).is_ok());
        assert!(validate_percentage("value", dec!(100.5)).is_err());
        assert!(validate_percentage("value", dec!(-1)).is_err());
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(1800).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }

    #[test]
    fn test_validate_rule() {
        let mut rule = DiscountRule {
            id: "rule-1".to_string(),
            name: "Category promo".to_string(),
            scope: RuleScope::Category,
            target_id: Some("antibiotics".to_string()),
            customer_tier: None,
            customer_type: None,
            customer_id: None,
            kind: DiscountKind::Percentage,
            value: dec!(15),
            quantity: QuantityRange {
                min_quantity: Some(10),
                max_quantity: Some(50),
            },
            window: ValidityWindow::always(),
            priority: 0,
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(validate_rule(&rule).is_ok());

        rule.target_id = None;
        assert!(matches!(validate_rule(&rule), Err(ValidationError::Required { .. })));
        rule.target_id = Some("antibiotics".to_string());

        rule.value = dec!(150);
        assert!(matches!(validate_rule(&rule), Err(ValidationError::OutOfRange { .. })));
        rule.value = dec!(15);

        rule.quantity.min_quantity = Some(60);
        assert!(matches!(validate_rule(&rule), Err(ValidationError::InvalidWindow { .. })));
    }

    #[test]
    fn test_validate_override_window() {
        let from = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let ovr = PriceOverride {
            id: "ovr-1".to_string(),
            product_id: "p-1".to_string(),
            region_id: None,
            customer_id: None,
            price_category: PriceCategory::Subsidized,
            unit_price: dec!(12),
            window: ValidityWindow::between(from, to),
            priority: 0,
            is_active: true,
            created_at: from,
        };
        assert!(matches!(validate_override(&ovr), Err(ValidationError::InvalidWindow { .. })));
    }

    #[test]
    fn test_validate_promotion() {
        let mut promotion = Promotion {
            id: "promo-1".to_string(),
            code: "BOGO".to_string(),
            name: "Buy two get one".to_string(),
            kind: PromotionKind::BuyXGetY,
            value: dec!(0),
            buy_quantity: Some(2),
            get_quantity: Some(1),
            bundle_size: None,
            min_order_amount: None,
            max_discount: None,
            window: ValidityWindow::always(),
            usage_limit: Some(100),
            per_customer_limit: None,
            usage_count: 0,
            target: PromotionTarget::everyone(),
            stacks_with_promotions: false,
            stacks_with_rules: true,
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(validate_promotion(&promotion).is_ok());

        promotion.get_quantity = None;
        assert!(validate_promotion(&promotion).is_err());
        promotion.get_quantity = Some(1);

        promotion.usage_limit = Some(0);
        assert!(matches!(
            validate_promotion(&promotion),
            Err(ValidationError::MustBePositive { .. })
        ));
        promotion.usage_limit = None;

        promotion.kind = PromotionKind::Bundle;
        assert!(validate_promotion(&promotion).is_err());
        promotion.bundle_size = Some(3);
        assert!(validate_promotion(&promotion).is_ok());
    }
}
