//! WebSocket message types.
//!
//! All frames, both directions, share the envelope
//! `{type: string, data: object, timestamp: string}`. Incoming timestamps are
//! ignored; outgoing ones are stamped at serialization time (RFC 3339).

use crate::types::{TradeDirection, TradeOutcome};
use serde::{Deserialize, Serialize};

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

// =============================================================================
// Client -> Server
// =============================================================================

/// Subscription handshake payload.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscribePayload {
    /// Bearer token issued by the identity provider.
    pub token: String,
}

/// Incoming WebSocket message from a client.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to the token's user; evicts any prior
    /// connection held by the same user.
    SubscribeUser { data: SubscribePayload },
    /// Join the operator broadcast group. Requires operator role.
    SubscribeAdmin { data: SubscribePayload },
    /// Heartbeat. Answered with `pong`.
    Ping,
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Confirmation payload for a successful subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscribedData {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Settlement result, routed to the owning user only.
#[derive(Debug, Clone, Serialize)]
pub struct TradeResultData {
    pub trade_id: String,
    pub outcome: TradeOutcome,
    pub profit: f64,
    pub new_balance: f64,
    pub exit_price: f64,
}

/// Settlement activity, broadcast to all operator connections.
#[derive(Debug, Clone, Serialize)]
pub struct TradeActivityData {
    pub user_id: String,
    pub pair: String,
    pub direction: TradeDirection,
    pub stake: f64,
    pub outcome: TradeOutcome,
    pub profit: f64,
}

/// Error payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub message: String,
}

/// Empty payload for frames that carry no data.
#[derive(Debug, Clone, Serialize)]
pub struct EmptyData {}

/// Outgoing WebSocket message to a client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Subscribed {
        data: SubscribedData,
        timestamp: String,
    },
    TradeResult {
        data: TradeResultData,
        timestamp: String,
    },
    TradeActivity {
        data: TradeActivityData,
        timestamp: String,
    },
    Pong {
        data: EmptyData,
        timestamp: String,
    },
    Error {
        data: ErrorData,
        timestamp: String,
    },
}

impl ServerMessage {
    pub fn subscribed(role: &str, user_id: Option<String>) -> Self {
        ServerMessage::Subscribed {
            data: SubscribedData {
                role: role.to_string(),
                user_id,
            },
            timestamp: now_rfc3339(),
        }
    }

    pub fn trade_result(data: TradeResultData) -> Self {
        ServerMessage::TradeResult {
            data,
            timestamp: now_rfc3339(),
        }
    }

    pub fn trade_activity(data: TradeActivityData) -> Self {
        ServerMessage::TradeActivity {
            data,
            timestamp: now_rfc3339(),
        }
    }

    pub fn pong() -> Self {
        ServerMessage::Pong {
            data: EmptyData {},
            timestamp: now_rfc3339(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            data: ErrorData {
                message: message.into(),
            },
            timestamp: now_rfc3339(),
        }
    }

    /// Serialize to the wire string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","data":{"message":"serialization failure"},"timestamp":""}"#
                .to_string()
        })
    }
}
