//! # Error Types
//!
//! Domain-specific error types for pharos-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pharos-core errors (this file)                                        │
//! │  ├── PricingError        - What ResolvePrice returns on failure        │
//! │  │   ├── Validation      - unknown entity, bad quantity                │
//! │  │   └── Rejected        - typed PromotionRejection for one code       │
//! │  ├── ValidationError     - Input validation failures                   │
//! │  ├── PromotionRejection  - Why a promotion code cannot be used         │
//! │  └── UsageConflict       - Lost a race for the last redemption slot    │
//! │                                                                         │
//! │  pharos-db errors (separate crate)                                     │
//! │  └── DbError             - Database operation failures                 │
//! │                                                                         │
//! │  AmbiguousMatch is NOT an error: see crate::audit                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (code, ID, etc.)
//! 3. A rejection is never turned into full price or zero behind the caller's back

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Pricing Error
// =============================================================================

/// Failure of a price resolution call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    /// The request referenced something invalid (unknown product, zero quantity).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A requested promotion code cannot be applied.
    ///
    /// ## User Workflow
    /// ```text
    /// ResolvePrice(code: "FLU10")
    ///      │
    ///      ▼
    /// Rejected { code: "FLU10", reason: UsageLimitReached }
    ///      │
    ///      ▼
    /// Order subsystem re-resolves the line without "FLU10"
    /// ```
    #[error("Promotion {code} rejected: {reason}")]
    Rejected {
        code: String,
        reason: PromotionRejection,
    },
}

impl PricingError {
    pub fn rejected(code: impl Into<String>, reason: PromotionRejection) -> Self {
        PricingError::Rejected {
            code: code.into(),
            reason,
        }
    }

    /// Returns the rejection reason, if this is a promotion rejection.
    pub fn rejection(&self) -> Option<PromotionRejection> {
        match self {
            PricingError::Rejected { reason, .. } => Some(*reason),
            PricingError::Validation(_) => None,
        }
    }
}

// =============================================================================
// Promotion Rejection
// =============================================================================

/// Why a promotion code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum PromotionRejection {
    #[error("promotion code not found")]
    NotFound,

    #[error("promotion has expired")]
    Expired,

    #[error("promotion is not active yet")]
    NotYetActive,

    #[error("promotion usage limit reached")]
    UsageLimitReached,

    #[error("per-customer usage limit reached")]
    PerCustomerLimitReached,

    #[error("minimum order amount not met")]
    MinimumOrderNotMet,

    #[error("promotion does not apply to this customer")]
    NotApplicableToCustomer,

    #[error("promotion does not apply to this product")]
    NotApplicableToProduct,

    /// A further code was supplied but stacking with other promotions is off.
    #[error("promotion cannot be combined with other promotions")]
    StackingNotAllowed,

    /// The same code appears twice in one request.
    #[error("promotion code supplied more than once")]
    DuplicateCode,
}

// =============================================================================
// Usage Conflict
// =============================================================================

/// Returned by a usage store when the conditional increment did not happen.
///
/// The ledger re-checks the counter and retries once before turning this
/// into a [`PromotionRejection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UsageConflict {
    #[error("total usage cap reached")]
    TotalCapReached,

    #[error("per-customer usage cap reached")]
    CustomerCapReached,

    #[error("promotion no longer exists")]
    Missing,
}

impl From<UsageConflict> for PromotionRejection {
    fn from(conflict: UsageConflict) -> Self {
        match conflict {
            UsageConflict::TotalCapReached => PromotionRejection::UsageLimitReached,
            UsageConflict::CustomerCapReached => PromotionRejection::PerCustomerLimitReached,
            UsageConflict::Missing => PromotionRejection::NotFound,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Used for pricing requests and for administrative definitions alike.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, lower-case promotion code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Referenced entity does not exist in the supplied snapshot.
    #[error("unknown {entity}: {id}")]
    UnknownEntity { entity: String, id: String },

    /// Referenced entity exists but is switched off.
    #[error("{entity} {id} is inactive")]
    Inactive { entity: String, id: String },

    /// A `from`/`to` pair is reversed.
    #[error("{field} starts after it ends")]
    InvalidWindow { field: String },
}

impl ValidationError {
    pub fn unknown(entity: impl Into<String>, id: impl Into<String>) -> Self {
        ValidationError::UnknownEntity {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with PricingError.
pub type CoreResult<T> = Result<T, PricingError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PricingError::rejected("FLU10", PromotionRejection::UsageLimitReached);
        assert_eq!(
            err.to_string(),
            "Promotion FLU10 rejected: promotion usage limit reached"
        );
        assert_eq!(err.rejection(), Some(PromotionRejection::UsageLimitReached));
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");

        let err = ValidationError::unknown("product", "p-1");
        assert_eq!(err.to_string(), "unknown product: p-1");
    }

    #[test]
    fn test_validation_converts_to_pricing_error() {
        let validation_err = ValidationError::Required {
            field: "code".to_string(),
        };
        let err: PricingError = validation_err.into();
        assert!(matches!(err, PricingError::Validation(_)));
        assert_eq!(err.rejection(), None);
    }

    #[test]
    fn test_conflict_maps_to_rejection() {
        assert_eq!(
            PromotionRejection::from(UsageConflict::TotalCapReached),
            PromotionRejection::UsageLimitReached
        );
        assert_eq!(
            PromotionRejection::from(UsageConflict::CustomerCapReached),
            PromotionRejection::PerCustomerLimitReached
        );
    }
}
