//! Mirage - timed-trade settlement engine with real-time result push.
//!
//! A user stakes an amount on a short fixed-duration trade; the stake is
//! escrowed immediately, the outcome is resolved once at expiry under an
//! operator-configurable policy, and the result is pushed to the user's live
//! WebSocket connection and broadcast to operator sessions.

pub mod api;
pub mod config;
pub mod services;
pub mod types;
pub mod websocket;

use config::Config;
use services::{AuthService, PolicyStore, PriceFeed, SettlementScheduler, TradeLedger, TradeService};
use std::sync::Arc;
use websocket::ConnectionRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub ledger: Arc<TradeLedger>,
    pub policies: Arc<PolicyStore>,
    pub feed: Arc<PriceFeed>,
    pub registry: Arc<ConnectionRegistry>,
    pub scheduler: Arc<SettlementScheduler>,
    pub trade_service: Arc<TradeService>,
}
