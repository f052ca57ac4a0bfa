//! Connection registry.
//!
//! Tracks live push channels: one slot per user (a new subscribe atomically
//! evicts the previous connection for that user) and an open broadcast set
//! for operators. Senders are bounded; delivery is try_send and never blocks
//! the settlement path.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A user's live push channel.
pub struct UserChannel {
    pub channel_id: Uuid,
    tx: mpsc::Sender<String>,
}

/// Registry of live WebSocket channels.
pub struct ConnectionRegistry {
    /// Single active channel per user id.
    users: DashMap<String, UserChannel>,
    /// Operator broadcast set, keyed by channel id.
    operators: DashMap<Uuid, mpsc::Sender<String>>,
}

impl ConnectionRegistry {
    /// Create a new registry.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            users: DashMap::new(),
            operators: DashMap::new(),
        })
    }

    /// Attach a user channel. Any prior channel for the same user is evicted:
    /// the insert is a single atomic swap, and dropping the old sender closes
    /// the old connection's forward loop.
    pub fn attach_user(&self, user_id: &str, channel_id: Uuid, tx: mpsc::Sender<String>) {
        let prior = self.users.insert(
            user_id.to_string(),
            UserChannel { channel_id, tx },
        );
        if let Some(prior) = prior {
            debug!(
                user_id,
                evicted = %prior.channel_id,
                "Evicted prior user connection"
            );
        }
    }

    /// Detach a user channel. Only removes the slot if it still belongs to
    /// this channel, so a reconnect that already replaced it is untouched.
    /// Safe to call repeatedly.
    pub fn detach_user(&self, user_id: &str, channel_id: Uuid) {
        self.users
            .remove_if(user_id, |_, channel| channel.channel_id == channel_id);
    }

    /// Add an operator channel to the broadcast set.
    pub fn attach_operator(&self, channel_id: Uuid, tx: mpsc::Sender<String>) {
        self.operators.insert(channel_id, tx);
    }

    /// Remove an operator channel. Safe to call repeatedly.
    pub fn detach_operator(&self, channel_id: Uuid) {
        self.operators.remove(&channel_id);
    }

    /// Deliver a message to a user's live channel. Returns false when the
    /// user has no live channel; callers treat that as "offline", not an
    /// error. A full buffer drops the message rather than blocking.
    pub fn route_to_user(&self, user_id: &str, message: &str) -> bool {
        let Some(channel) = self.users.get(user_id) else {
            return false;
        };
        match channel.tx.try_send(message.to_string()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user_id, "User channel full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user_id, "User channel closed");
                false
            }
        }
    }

    /// Deliver a message to every operator channel. Returns the number of
    /// channels it was handed to.
    pub fn broadcast_operators(&self, message: &str) -> usize {
        let mut delivered = 0;
        for entry in self.operators.iter() {
            if entry.value().try_send(message.to_string()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live user channels.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Number of live operator channels.
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            operators: DashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
        mpsc::channel(8)
    }

    #[test]
    fn test_single_active_session() {
        let registry = ConnectionRegistry::default();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.attach_user("user-1", first, tx1);
        registry.attach_user("user-1", second, tx2);
        assert_eq!(registry.user_count(), 1);

        // Only the second channel receives
        assert!(registry.route_to_user("user-1", "hello"));
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_stale_detach_does_not_orphan_reconnect() {
        let registry = ConnectionRegistry::default();
        let (tx1, _rx1) = channel();
        let (tx2, mut rx2) = channel();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        registry.attach_user("user-1", first, tx1);
        registry.attach_user("user-1", second, tx2);

        // The evicted connection's cleanup runs late; the new slot survives.
        registry.detach_user("user-1", first);
        assert_eq!(registry.user_count(), 1);
        assert!(registry.route_to_user("user-1", "still here"));
        assert_eq!(rx2.try_recv().unwrap(), "still here");

        registry.detach_user("user-1", second);
        registry.detach_user("user-1", second);
        assert_eq!(registry.user_count(), 0);
    }

    #[test]
    fn test_route_to_offline_user() {
        let registry = ConnectionRegistry::default();
        assert!(!registry.route_to_user("nobody", "msg"));
    }

    #[test]
    fn test_full_buffer_drops_instead_of_blocking() {
        let registry = ConnectionRegistry::default();
        let (tx, _rx) = mpsc::channel(1);
        registry.attach_user("user-1", Uuid::new_v4(), tx);

        assert!(registry.route_to_user("user-1", "first"));
        // Buffer of one is now full; the send drops
        assert!(!registry.route_to_user("user-1", "second"));
    }

    #[test]
    fn test_operator_broadcast_counts() {
        let registry = ConnectionRegistry::default();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        registry.attach_operator(a, tx1);
        registry.attach_operator(b, tx2);
        assert_eq!(registry.operator_count(), 2);

        assert_eq!(registry.broadcast_operators("event"), 2);
        assert_eq!(rx1.try_recv().unwrap(), "event");
        assert_eq!(rx2.try_recv().unwrap(), "event");

        registry.detach_operator(a);
        registry.detach_operator(a);
        assert_eq!(registry.broadcast_operators("event"), 1);
    }
}
