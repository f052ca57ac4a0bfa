use crate::types::TradePolicy;
use std::env;

/// Trade validation limits.
#[derive(Debug, Clone)]
pub struct TradeLimits {
    /// Allowed trade durations in seconds.
    pub allowed_durations: Vec<u32>,
    /// Minimum stake per trade.
    pub min_stake: f64,
    /// Maximum stake per trade.
    pub max_stake: f64,
}

impl Default for TradeLimits {
    fn default() -> Self {
        Self {
            allowed_durations: vec![30, 60, 120, 300],
            min_stake: 1.0,
            max_stake: 10_000.0,
        }
    }
}

/// WebSocket tuning.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Per-connection outbound buffer (messages). Sends beyond this are dropped.
    pub send_buffer: usize,
    /// Connections silent for longer than this are dropped (ms).
    pub heartbeat_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            send_buffer: 64,
            heartbeat_timeout_ms: 60_000,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite ledger path.
    pub database_path: String,
    /// HMAC secret for token verification.
    pub auth_secret: String,
    /// Trade validation limits.
    pub limits: TradeLimits,
    /// Global default settlement policy, used until an operator writes one.
    pub default_policy: TradePolicy,
    /// WebSocket tuning.
    pub ws: WsConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        // Format: "30,60,120,300"
        let allowed_durations = env::var("TRADE_DURATIONS")
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|d| d.trim().parse().ok())
                    .collect::<Vec<u32>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| TradeLimits::default().allowed_durations);

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "mirage.db".to_string()),
            auth_secret: env::var("AUTH_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".to_string()),
            limits: TradeLimits {
                allowed_durations,
                min_stake: env::var("MIN_STAKE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1.0),
                max_stake: env::var("MAX_STAKE")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10_000.0),
            },
            default_policy: TradePolicy {
                win_rate_bp: env::var("DEFAULT_WIN_RATE_BP")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5_000),
                profit_rate_min_bp: env::var("PROFIT_RATE_MIN_BP")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(7_000),
                profit_rate_max_bp: env::var("PROFIT_RATE_MAX_BP")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(9_000),
                forced_outcome: None,
            },
            ws: WsConfig {
                send_buffer: env::var("WS_SEND_BUFFER")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(64),
                heartbeat_timeout_ms: env::var("WS_HEARTBEAT_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60_000),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
