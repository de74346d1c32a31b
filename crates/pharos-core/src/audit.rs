//! # Audit Records
//!
//! What a PricedLine carries so an administrator can reconstruct the price:
//! the ordered contributions, and any ties that had to be broken.
//!
//! ```text
//! base 100.00
//!   - Override  ovr-7     20.00   → 80.00
//!   - Rule      rule-12    8.00   → 72.00
//!   - Promotion FLU10      7.20   → 64.80
//!   = unit price                    64.80
//! ```

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::money::Money;

// =============================================================================
// Price Adjustments
// =============================================================================

/// Which step produced a contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentSource {
    Override,
    Rule,
    Promotion,
    /// Raising a negative intermediate back to zero.
    Clamp,
}

/// One signed contribution to the final unit price.
///
/// `amount` is subtracted from the running price: positive means cheaper,
/// negative means the step raised the price (an override above list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceAdjustment {
    pub source: AdjustmentSource,
    /// Override id, rule id or promotion code. `None` for clamping.
    pub reference: Option<String>,
    /// Per-unit amount, rounded for output.
    pub amount: Money,
}

// =============================================================================
// Ambiguous Match Warning
// =============================================================================

/// Which selection produced the tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Override,
    Rule,
}

/// The last criterion that separated the tied candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Newest `created_at` won.
    MostRecent,
    /// Identical timestamps; greatest id won.
    Identifier,
}

/// Non-fatal warning: several candidates were equally ranked and a
/// deterministic tie-break picked the winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousMatch {
    pub kind: MatchKind,
    pub winner_id: String,
    pub tied_with: Vec<String>,
    pub decided_by: TieBreak,
}

impl AmbiguousMatch {
    /// Emits the warning on the log channel.
    pub fn log(&self, product_id: &str) {
        warn!(
            kind = ?self.kind,
            product_id = %product_id,
            winner = %self.winner_id,
            tied_with = ?self.tied_with,
            decided_by = ?self.decided_by,
            "Ambiguous pricing match resolved by tie-break"
        );
    }
}
