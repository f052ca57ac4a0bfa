//! Tests for the WebSocket surface: wire framing, token verification, and
//! connection registry session semantics.

use mirage::services::{AuthService, Role};
use mirage::types::{ClientMessage, ServerMessage, TradeActivityData, TradeDirection, TradeOutcome};
use mirage::websocket::ConnectionRegistry;
use tokio::sync::mpsc;
use uuid::Uuid;

// =============================================================================
// Wire framing
// =============================================================================

#[test]
fn test_subscribe_user_frame() {
    let json = r#"{"type":"subscribe_user","data":{"token":"u-1.user.cafe"},"timestamp":"2026-08-05T10:00:00Z"}"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();
    match msg {
        ClientMessage::SubscribeUser { data } => assert_eq!(data.token, "u-1.user.cafe"),
        _ => panic!("Expected SubscribeUser message"),
    }
}

#[test]
fn test_subscribe_admin_frame() {
    let json = r#"{"type":"subscribe_admin","data":{"token":"ops.operator.beef"}}"#;
    let msg: ClientMessage = serde_json::from_str(json).unwrap();
    assert!(matches!(msg, ClientMessage::SubscribeAdmin { .. }));
}

#[test]
fn test_unknown_type_rejected() {
    let json = r#"{"type":"subscribe_everything","data":{}}"#;
    assert!(serde_json::from_str::<ClientMessage>(json).is_err());
}

#[test]
fn test_envelope_shape() {
    let msg = ServerMessage::trade_activity(TradeActivityData {
        user_id: "user-1".to_string(),
        pair: "ETH/USDT".to_string(),
        direction: TradeDirection::Up,
        stake: 12.5,
        outcome: TradeOutcome::Win,
        profit: 10.0,
    });

    let value: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
    assert_eq!(value["type"], "trade_activity");
    assert!(value["data"].is_object());
    assert!(value["timestamp"].is_string());
}

#[test]
fn test_error_and_pong_frames() {
    let value: serde_json::Value =
        serde_json::from_str(&ServerMessage::error("bad token").to_json()).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["data"]["message"], "bad token");

    let value: serde_json::Value =
        serde_json::from_str(&ServerMessage::pong().to_json()).unwrap();
    assert_eq!(value["type"], "pong");
}

// =============================================================================
// Token verification
// =============================================================================

#[test]
fn test_token_round_trip_for_both_roles() {
    let auth = AuthService::new("integration-secret");

    let user_token = auth.mint_token("user-1", Role::User);
    let identity = auth.verify_token(&user_token).unwrap();
    assert_eq!(identity.user_id, "user-1");
    assert!(!identity.is_operator());

    let ops_token = auth.mint_token("ops-1", Role::Operator);
    assert!(auth.verify_token(&ops_token).unwrap().is_operator());

    assert!(auth.verify_token("user-1.operator.0000").is_none());
}

// =============================================================================
// Session semantics
// =============================================================================

#[tokio::test]
async fn test_second_subscribe_evicts_first_session() {
    let registry = ConnectionRegistry::new();

    let (tx1, mut rx1) = mpsc::channel(8);
    let (tx2, mut rx2) = mpsc::channel(8);
    registry.attach_user("user-1", Uuid::new_v4(), tx1);
    registry.attach_user("user-1", Uuid::new_v4(), tx2);

    assert_eq!(registry.user_count(), 1);
    assert!(registry.route_to_user("user-1", "result"));

    // Only the live (second) session received anything; the first channel's
    // sender was dropped by the swap, which closes that connection.
    assert!(rx1.try_recv().is_err());
    assert_eq!(rx2.try_recv().unwrap(), "result");
}

#[tokio::test]
async fn test_operator_sessions_are_additive() {
    let registry = ConnectionRegistry::new();

    let (tx1, mut rx1) = mpsc::channel(8);
    let (tx2, mut rx2) = mpsc::channel(8);
    registry.attach_operator(Uuid::new_v4(), tx1);
    registry.attach_operator(Uuid::new_v4(), tx2);

    assert_eq!(registry.broadcast_operators("activity"), 2);
    assert!(rx1.try_recv().is_ok());
    assert!(rx2.try_recv().is_ok());
}
