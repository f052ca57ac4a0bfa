//! Outcome resolution.
//!
//! Pure function from (stake, policy, rng) to a settlement. No I/O, no
//! clock, no shared state; the RNG is injected so tests can seed it.

use crate::types::{TradeOutcome, TradePolicy, BP_SCALE};
use rand::Rng;

/// Resolved outcome and signed profit for one trade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub outcome: TradeOutcome,
    pub profit: f64,
}

/// Resolve a trade's outcome under the given policy.
///
/// A forced outcome short-circuits the draw. Otherwise a uniform draw in
/// [0, 10000) wins iff it lands below `win_rate_bp`. Winning profit is
/// `stake * r` with `r` drawn uniformly from the policy's profit rate range;
/// losing profit is always `-stake`.
pub fn resolve<R: Rng + ?Sized>(stake: f64, policy: &TradePolicy, rng: &mut R) -> Settlement {
    let outcome = match policy.forced_outcome {
        Some(forced) => forced,
        None => {
            let draw = rng.gen_range(0..BP_SCALE);
            if draw < policy.win_rate_bp {
                TradeOutcome::Win
            } else {
                TradeOutcome::Lose
            }
        }
    };

    let profit = match outcome {
        TradeOutcome::Win => {
            let rate_bp = rng.gen_range(policy.profit_rate_min_bp..=policy.profit_rate_max_bp);
            round_cents(stake * rate_bp as f64 / BP_SCALE as f64)
        }
        TradeOutcome::Lose => -stake,
    };

    Settlement { outcome, profit }
}

/// Round to two decimal places.
fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
