//! Trade service.
//!
//! Public entry point for trade creation and queries. Validation and escrow
//! are synchronous; only the eventual settlement is deferred. The outcome is
//! never decided here: policy is read at settlement time, by the scheduler.

use crate::config::TradeLimits;
use crate::services::ledger::{LedgerError, TradeLedger};
use crate::services::{PriceFeed, SettlementScheduler};
use crate::types::{CreateTradeRequest, Trade, TradeHistoryPage};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Maximum history page size.
const MAX_PAGE_LIMIT: u32 = 100;

/// Trade service errors.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Invalid duration: {0}s is not an allowed trade duration")]
    InvalidDuration(u32),

    #[error("Stake {stake} out of range [{min}, {max}]")]
    StakeOutOfRange { stake: f64, min: f64, max: f64 },

    #[error("Unknown pair: {0}")]
    UnknownPair(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Orchestrator for trade creation and queries.
pub struct TradeService {
    limits: TradeLimits,
    ledger: Arc<TradeLedger>,
    scheduler: Arc<SettlementScheduler>,
    feed: Arc<PriceFeed>,
}

impl TradeService {
    pub fn new(
        limits: TradeLimits,
        ledger: Arc<TradeLedger>,
        scheduler: Arc<SettlementScheduler>,
        feed: Arc<PriceFeed>,
    ) -> Arc<Self> {
        Arc::new(Self {
            limits,
            ledger,
            scheduler,
            feed,
        })
    }

    /// Create a trade: validate, escrow the stake, arm the settlement timer.
    /// Every failure is synchronous and terminal for this request.
    pub fn create_trade(
        &self,
        user_id: &str,
        request: CreateTradeRequest,
    ) -> Result<Trade, TradeError> {
        if !self
            .limits
            .allowed_durations
            .contains(&request.duration_seconds)
        {
            return Err(TradeError::InvalidDuration(request.duration_seconds));
        }
        if request.stake < self.limits.min_stake || request.stake > self.limits.max_stake {
            return Err(TradeError::StakeOutOfRange {
                stake: request.stake,
                min: self.limits.min_stake,
                max: self.limits.max_stake,
            });
        }
        let entry_price = self
            .feed
            .current_price(&request.pair)
            .ok_or_else(|| TradeError::UnknownPair(request.pair.clone()))?;

        let trade = Trade::new(
            user_id.to_string(),
            request.pair,
            request.stake,
            request.direction,
            request.duration_seconds,
            entry_price,
        );

        self.ledger.escrow(&trade)?;
        self.scheduler.arm(&trade);

        info!(
            trade_id = %trade.id,
            user_id,
            stake = trade.stake,
            duration = trade.duration_seconds,
            "Trade created"
        );
        Ok(trade)
    }

    /// A user's active trades, soonest expiry first.
    pub fn list_active(&self, user_id: &str) -> Result<Vec<Trade>, TradeError> {
        Ok(self.ledger.active_trades(user_id)?)
    }

    /// One page of a user's trade history, newest first. Page numbers are
    /// 1-based; limit is clamped to [1, 100].
    pub fn list_history(
        &self,
        user_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<TradeHistoryPage, TradeError> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_LIMIT);
        let offset = (page - 1) * limit;

        let (trades, total) = self.ledger.history(user_id, limit, offset)?;
        let total_pages = total.div_ceil(limit as u64);

        Ok(TradeHistoryPage {
            trades,
            page,
            limit,
            total,
            total_pages,
        })
    }
}
