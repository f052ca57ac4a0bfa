//! WebSocket transport.
//!
//! Lifecycle per connection: upgrade, wait for a `subscribe_user` or
//! `subscribe_admin` handshake carrying a bearer token, then push messages
//! from the registry channel until the peer disconnects or goes silent past
//! the heartbeat timeout. `ping` frames (application-level) answer with
//! `pong` and reset the idle clock.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{ClientMessage, ServerMessage};
use crate::AppState;

/// What this connection is bound to after its handshake.
enum Binding {
    None,
    User { user_id: String },
    Operator,
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let channel_id = Uuid::new_v4();

    let (tx, mut rx) = mpsc::channel::<String>(state.config.ws.send_buffer);

    // Forward registry messages to the socket. Ends when every sender is
    // dropped, which is also how eviction closes a replaced connection.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    debug!(%channel_id, "WebSocket connected");

    let idle_limit = Duration::from_millis(state.config.ws.heartbeat_timeout_ms);
    let mut binding = Binding::None;

    loop {
        let frame = match tokio::time::timeout(idle_limit, receiver.next()).await {
            Err(_) => {
                info!(%channel_id, "Connection idle past heartbeat timeout, dropping");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(%channel_id, "WebSocket error: {}", e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                handle_message(&state, channel_id, &tx, &mut binding, &text);
            }
            Message::Close(_) => {
                debug!(%channel_id, "WebSocket closing");
                break;
            }
            // Protocol-level pings are answered by axum; both directions
            // count as liveness by reaching this loop at all.
            Message::Ping(_) | Message::Pong(_) => {}
            _ => {}
        }
    }

    match &binding {
        Binding::User { user_id } => state.registry.detach_user(user_id, channel_id),
        Binding::Operator => state.registry.detach_operator(channel_id),
        Binding::None => {}
    }
    send_task.abort();
    debug!(%channel_id, "WebSocket disconnected");
}

fn handle_message(
    state: &AppState,
    channel_id: Uuid,
    tx: &mpsc::Sender<String>,
    binding: &mut Binding,
    text: &str,
) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            send(tx, &ServerMessage::error(format!("Invalid message: {}", e)));
            return;
        }
    };

    match msg {
        ClientMessage::SubscribeUser { data } => {
            let Some(identity) = state.auth.verify_token(&data.token) else {
                warn!(%channel_id, "Rejected subscribe_user with invalid token");
                send(tx, &ServerMessage::error("Invalid token"));
                return;
            };

            release_binding(state, channel_id, binding);
            state
                .registry
                .attach_user(&identity.user_id, channel_id, tx.clone());
            *binding = Binding::User {
                user_id: identity.user_id.clone(),
            };

            info!(user_id = %identity.user_id, %channel_id, "User subscribed");
            send(
                tx,
                &ServerMessage::subscribed(identity.role.as_str(), Some(identity.user_id)),
            );
        }
        ClientMessage::SubscribeAdmin { data } => {
            let Some(identity) = state.auth.verify_token(&data.token) else {
                warn!(%channel_id, "Rejected subscribe_admin with invalid token");
                send(tx, &ServerMessage::error("Invalid token"));
                return;
            };
            if !identity.is_operator() {
                send(tx, &ServerMessage::error("Operator role required"));
                return;
            }

            release_binding(state, channel_id, binding);
            state.registry.attach_operator(channel_id, tx.clone());
            *binding = Binding::Operator;

            info!(operator = %identity.user_id, %channel_id, "Operator subscribed");
            send(tx, &ServerMessage::subscribed("operator", None));
        }
        ClientMessage::Ping => {
            send(tx, &ServerMessage::pong());
        }
    }
}

/// Drop whatever this connection was previously bound to (a client may
/// re-handshake on the same socket).
fn release_binding(state: &AppState, channel_id: Uuid, binding: &mut Binding) {
    match binding {
        Binding::User { user_id } => state.registry.detach_user(user_id, channel_id),
        Binding::Operator => state.registry.detach_operator(channel_id),
        Binding::None => {}
    }
    *binding = Binding::None;
}

fn send(tx: &mpsc::Sender<String>, msg: &ServerMessage) {
    // try_send: a client that cannot drain its own handshake replies is not
    // worth blocking on.
    let _ = tx.try_send(msg.to_json());
}
