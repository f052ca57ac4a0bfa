//! Trade Types
//!
//! Types for the timed-trade engine: trades, outcomes, history pages, and
//! the balance transaction audit trail.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Direction the user wagers the price will move. Cosmetic: settlement math
/// never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Up,
    Down,
}

impl std::fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeDirection::Up => write!(f, "up"),
            TradeDirection::Down => write!(f, "down"),
        }
    }
}

/// Terminal outcome of a settled trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    Win,
    Lose,
}

impl std::fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "win"),
            TradeOutcome::Lose => write!(f, "lose"),
        }
    }
}

/// Trade lifecycle state. The only transition is Active -> Settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    Active,
    Settled,
}

impl std::fmt::Display for TradeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeState::Active => write!(f, "active"),
            TradeState::Settled => write!(f, "settled"),
        }
    }
}

// =============================================================================
// Trade
// =============================================================================

/// A timed trade. The stake is escrowed at creation and resolved exactly once
/// at (or after) `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    /// Market pair, e.g. "BTC/USDT". Cosmetic.
    pub pair: String,
    pub stake: f64,
    pub direction: TradeDirection,
    pub duration_seconds: u32,
    /// Price at creation. Cosmetic.
    pub entry_price: f64,
    /// Price at settlement. Cosmetic.
    pub exit_price: Option<f64>,
    pub state: TradeState,
    pub outcome: Option<TradeOutcome>,
    /// Signed profit: positive on win, `-stake` on lose. Absent while active.
    pub profit: Option<f64>,
    /// Creation timestamp (ms since epoch).
    pub created_at: i64,
    /// Settlement due time (ms since epoch) = created_at + duration.
    pub expires_at: i64,
    pub settled_at: Option<i64>,
}

impl Trade {
    /// Create a new active trade.
    pub fn new(
        user_id: String,
        pair: String,
        stake: f64,
        direction: TradeDirection,
        duration_seconds: u32,
        entry_price: f64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            pair,
            stake,
            direction,
            duration_seconds,
            entry_price,
            exit_price: None,
            state: TradeState::Active,
            outcome: None,
            profit: None,
            created_at: now,
            expires_at: now + (duration_seconds as i64) * 1000,
            settled_at: None,
        }
    }

    /// Whether the trade is past its settlement due time.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    /// Milliseconds until settlement is due (0 if already due).
    pub fn remaining_ms(&self, now_ms: i64) -> u64 {
        (self.expires_at - now_ms).max(0) as u64
    }
}

// =============================================================================
// Requests & Responses
// =============================================================================

/// Request body for trade creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTradeRequest {
    pub pair: String,
    pub stake: f64,
    pub direction: TradeDirection,
    pub duration_seconds: u32,
}

/// One page of trade history, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct TradeHistoryPage {
    pub trades: Vec<Trade>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

// =============================================================================
// Balance transactions
// =============================================================================

/// Kind of balance mutation recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Stake debited at trade creation.
    Escrow,
    /// Stake + profit credited on a winning settlement.
    TradeWin,
    /// Stake credit net of forfeiture on a losing settlement.
    TradeLose,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Escrow => write!(f, "escrow"),
            TransactionKind::TradeWin => write!(f, "trade_win"),
            TransactionKind::TradeLose => write!(f, "trade_lose"),
        }
    }
}

/// Immutable record of a single balance mutation.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionRecord {
    pub id: String,
    pub user_id: String,
    pub trade_id: String,
    pub kind: TransactionKind,
    pub amount: f64,
    pub balance_before: f64,
    pub balance_after: f64,
    pub created_at: i64,
}
