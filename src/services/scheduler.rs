//! Settlement scheduler.
//!
//! Arms one deferred settlement per active trade and guarantees each trade
//! settles exactly once, logically: timers may fire more than once across
//! restarts, but the ledger's idempotent settle absorbs duplicates.
//!
//! The persisted `expires_at` is the source of truth. In-process timers are
//! an optimization; `recover()` rebuilds them from the ledger on startup and
//! settles anything already overdue.

use crate::services::ledger::{LedgerError, SettledTrade, TradeLedger};
use crate::services::{outcome, NotificationBus, PolicyStore, PriceFeed};
use crate::types::{Trade, TradeOutcome};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Deferred settlement engine.
pub struct SettlementScheduler {
    ledger: Arc<TradeLedger>,
    policies: Arc<PolicyStore>,
    feed: Arc<PriceFeed>,
    notifier: Arc<NotificationBus>,
    /// Pending timer per trade id, for early-settlement cancellation.
    timers: DashMap<String, JoinHandle<()>>,
}

impl SettlementScheduler {
    pub fn new(
        ledger: Arc<TradeLedger>,
        policies: Arc<PolicyStore>,
        feed: Arc<PriceFeed>,
        notifier: Arc<NotificationBus>,
    ) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            policies,
            feed,
            notifier,
            timers: DashMap::new(),
        })
    }

    /// Arm a settlement timer for a trade. Due (or overdue) trades fire
    /// immediately.
    pub fn arm(self: &Arc<Self>, trade: &Trade) {
        let now = chrono::Utc::now().timestamp_millis();
        let delay = trade.remaining_ms(now);
        let trade_id = trade.id.clone();

        let scheduler = Arc::clone(self);
        let task_id = trade_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            scheduler.fire(&task_id);
        });

        if let Some(prev) = self.timers.insert(trade_id, handle) {
            prev.abort();
        }
    }

    /// Timer expiry path. Settlement failures never propagate out of the
    /// scheduler; AlreadySettled is the expected duplicate-fire case.
    fn fire(&self, trade_id: &str) {
        self.timers.remove(trade_id);
        match self.settle(trade_id, None) {
            Ok(settled) => {
                debug!(
                    trade_id,
                    outcome = ?settled.trade.outcome,
                    "Trade settled on expiry"
                );
            }
            Err(LedgerError::AlreadySettled(_)) => {
                debug!(trade_id, "Settlement fired for already-settled trade");
            }
            Err(e) => {
                error!(trade_id, "Settlement failed: {}", e);
            }
        }
    }

    /// Operator early settlement: cancel the pending timer and settle now,
    /// optionally forcing the outcome. Uses the same settle path and the
    /// same idempotence as the expiry path.
    pub fn settle_now(
        &self,
        trade_id: &str,
        forced: Option<TradeOutcome>,
    ) -> Result<SettledTrade, LedgerError> {
        if let Some((_, handle)) = self.timers.remove(trade_id) {
            handle.abort();
        }
        self.settle(trade_id, forced)
    }

    /// Resolve and settle one trade. The effective policy is read here, at
    /// settlement time, inside the same pass that writes the ledger.
    fn settle(
        &self,
        trade_id: &str,
        forced: Option<TradeOutcome>,
    ) -> Result<SettledTrade, LedgerError> {
        let trade = self
            .ledger
            .get_trade(trade_id)?
            .ok_or_else(|| LedgerError::TradeNotFound(trade_id.to_string()))?;

        let mut policy = self.policies.for_user(&trade.user_id);
        if let Some(outcome) = forced {
            policy.forced_outcome = Some(outcome);
        }

        let settlement = outcome::resolve(trade.stake, &policy, &mut rand::thread_rng());
        let exit_price = self.feed.exit_price(trade.entry_price);

        let settled = self
            .ledger
            .settle(trade_id, settlement.outcome, settlement.profit, exit_price)?;
        self.notifier.publish_settlement(&settled);
        Ok(settled)
    }

    /// Reconciliation scan: re-arm every Active trade from the ledger.
    /// Overdue trades get a zero delay and settle immediately. Runs at
    /// startup and periodically thereafter, so a lost timer delays a
    /// settlement by at most one sweep interval. Returns the number of
    /// trades re-armed.
    pub fn recover(self: &Arc<Self>) -> Result<usize, LedgerError> {
        let pending = self.ledger.pending()?;
        let now = chrono::Utc::now().timestamp_millis();
        let overdue = pending.iter().filter(|t| t.is_expired(now)).count();

        for trade in &pending {
            self.arm(trade);
        }

        if !pending.is_empty() {
            debug!(
                "Reconciled {} active trades ({} overdue, settling now)",
                pending.len(),
                overdue
            );
        }
        Ok(pending.len())
    }

    /// Number of armed timers.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}
