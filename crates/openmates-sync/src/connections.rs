//! Per-user connection fan-out, replacing a single global broadcast with
//! membership scoped to the chats' owning user.
//!
//! Keyed by `(user_id, conn_id)` rather than `device_fingerprint_hash`: one
//! physical device may hold several live `ConnId`s across reconnects, and
//! excluding only the originating connection — not the whole device — is
//! exactly what both the live-write fan-out and the offline-replay fan-out
//! need.

use dashmap::DashMap;
use openmates_offline::Broadcaster;
use openmates_protocol::frames::EventFrame;
use openmates_reminders::Connectivity;
use tokio::sync::mpsc;
use tracing::warn;

/// Bound on a single connection's outbound queue. A session that can't
/// keep up with its own fan-out is dropped rather than let unbounded
/// backlog build up in memory.
const SEND_QUEUE_CAPACITY: usize = 256;

pub struct ConnectionRegistry {
    users: DashMap<String, DashMap<String, mpsc::Sender<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { users: DashMap::new() }
    }

    /// Registers a new connection and returns the receiver half the
    /// connection task should forward onto the socket.
    pub fn register(&self, user_id: &str, conn_id: &str) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        self.users
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id.to_string(), tx);
        rx
    }

    pub fn unregister(&self, user_id: &str, conn_id: &str) {
        if let Some(conns) = self.users.get(user_id) {
            conns.remove(conn_id);
        }
    }

    /// Sends `payload` to every live connection of `user_id` except
    /// `exclude_conn_id`. A connection whose queue is full is dropped from
    /// the registry: its receiving task's next `recv()` then observes a
    /// closed channel and exits on its own (overflow policy).
    fn send_to_user(&self, user_id: &str, payload: String, exclude_conn_id: Option<&str>) {
        let Some(conns) = self.users.get(user_id) else {
            return;
        };
        let mut overflowed = Vec::new();
        for entry in conns.iter() {
            let conn_id = entry.key();
            if Some(conn_id.as_str()) == exclude_conn_id {
                continue;
            }
            if entry.value().try_send(payload.clone()).is_err() {
                overflowed.push(conn_id.clone());
            }
        }
        drop(conns);
        if !overflowed.is_empty() {
            if let Some(conns) = self.users.get(user_id) {
                for conn_id in overflowed {
                    warn!(user_id, conn_id, "send queue overflowed; dropping session");
                    conns.remove(&conn_id);
                }
            }
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity for ConnectionRegistry {
    fn is_connected(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .map(|conns| !conns.is_empty())
            .unwrap_or(false)
    }

    fn broadcast(&self, user_id: &str, event: EventFrame) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        self.send_to_user(user_id, payload, None);
    }
}

impl Broadcaster for ConnectionRegistry {
    fn broadcast_except_device(&self, user_id: &str, exclude_device: &str, event: EventFrame) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        self.send_to_user(user_id, payload, Some(exclude_device));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> EventFrame {
        EventFrame::new("test_event")
    }

    #[tokio::test]
    async fn broadcast_excludes_the_sending_connection() {
        let registry = ConnectionRegistry::new();
        let mut rx_a = registry.register("u1", "a");
        let mut rx_b = registry.register("u1", "b");

        registry.broadcast_except_device("u1", "a", frame());

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn is_connected_reflects_registered_connections() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.is_connected("u1"));
        let _rx = registry.register("u1", "a");
        assert!(registry.is_connected("u1"));
        registry.unregister("u1", "a");
        assert!(!registry.is_connected("u1"));
    }

    #[tokio::test]
    async fn overflowed_session_is_dropped_from_the_registry() {
        let registry = ConnectionRegistry::new();
        let _rx = registry.register("u1", "a");

        for _ in 0..SEND_QUEUE_CAPACITY + 10 {
            registry.broadcast("u1", frame());
        }

        assert!(!registry.is_connected("u1"));
    }
}
