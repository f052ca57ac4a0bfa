//! Outcome Policy Types
//!
//! Operator-configurable settlement policy: win probability, profit rate
//! range, and an optional forced outcome that bypasses the draw entirely.

use crate::types::TradeOutcome;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Basis points in a whole (100%).
pub const BP_SCALE: u32 = 10_000;

/// Settlement policy for a scope (global default or a single user).
///
/// Read once per trade, at settlement time. Editing a policy therefore
/// affects trades that are already active (documented behavior).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradePolicy {
    /// Win probability in basis points, 0..=10000.
    pub win_rate_bp: u32,
    /// Lower bound of the profit rate applied to the stake on a win, in
    /// basis points.
    pub profit_rate_min_bp: u32,
    /// Upper bound of the profit rate, in basis points. Must be >= min.
    pub profit_rate_max_bp: u32,
    /// When set, the draw is skipped and every settlement under this scope
    /// resolves to the forced outcome.
    #[serde(default)]
    pub forced_outcome: Option<TradeOutcome>,
}

impl TradePolicy {
    /// Validate the policy at write time. Resolution never re-checks.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.win_rate_bp > BP_SCALE {
            return Err(PolicyError::InvalidWinRate(self.win_rate_bp));
        }
        if self.profit_rate_min_bp > self.profit_rate_max_bp {
            return Err(PolicyError::InvalidProfitRange {
                min: self.profit_rate_min_bp,
                max: self.profit_rate_max_bp,
            });
        }
        Ok(())
    }
}

impl Default for TradePolicy {
    fn default() -> Self {
        Self {
            win_rate_bp: 5_000,
            profit_rate_min_bp: 7_000,
            profit_rate_max_bp: 9_000,
            forced_outcome: None,
        }
    }
}

/// Policy write/read errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Win rate out of range: {0} bp (max 10000)")]
    InvalidWinRate(u32),

    #[error("Profit rate range inverted: min {min} bp > max {max} bp")]
    InvalidProfitRange { min: u32, max: u32 },

    #[error("Database error: {0}")]
    Database(String),
}
