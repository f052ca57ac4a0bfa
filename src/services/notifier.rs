//! Notification bus.
//!
//! Formats settlement events and fans them out through the connection
//! registry: the result to the owning user, the activity record to every
//! operator. Delivery is fire-and-forget; the ledger transaction has already
//! committed by the time anything is published, so an offline user just
//! learns the result from a later history query.

use crate::services::ledger::SettledTrade;
use crate::types::{ServerMessage, TradeActivityData, TradeResultData};
use crate::websocket::ConnectionRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Settlement event fan-out.
pub struct NotificationBus {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationBus {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Arc<Self> {
        Arc::new(Self { registry })
    }

    /// Publish a settled trade: `trade_result` to the owner, `trade_activity`
    /// to the operator broadcast set.
    pub fn publish_settlement(&self, settled: &SettledTrade) {
        let trade = &settled.trade;
        let (outcome, profit) = match (trade.outcome, trade.profit) {
            (Some(outcome), Some(profit)) => (outcome, profit),
            _ => {
                warn!(trade_id = %trade.id, "Settled trade missing outcome, not publishing");
                return;
            }
        };

        let result = ServerMessage::trade_result(TradeResultData {
            trade_id: trade.id.clone(),
            outcome,
            profit,
            new_balance: settled.new_balance,
            exit_price: trade.exit_price.unwrap_or(trade.entry_price),
        });
        if !self.registry.route_to_user(&trade.user_id, &result.to_json()) {
            debug!(user_id = %trade.user_id, trade_id = %trade.id, "User offline, result not pushed");
        }

        let activity = ServerMessage::trade_activity(TradeActivityData {
            user_id: trade.user_id.clone(),
            pair: trade.pair.clone(),
            direction: trade.direction,
            stake: trade.stake,
            outcome,
            profit,
        });
        let delivered = self.registry.broadcast_operators(&activity.to_json());
        debug!(trade_id = %trade.id, delivered, "Broadcast trade activity");
    }
}
