use dashmap::DashMap;
use serde_json::Value;
use std::sync::RwLock;

/// `reminder_pending_delivery:{user_id}` — per-user FIFO of JSON-encoded
/// event payloads. Drained atomically on a DeviceSession's
/// `Authenticated -> Subscribed` transition.
#[derive(Default)]
pub struct PendingDeliveryQueue {
    inner: DashMap<String, RwLock<Vec<Value>>>,
}

impl PendingDeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, user_id: &str, payload: Value) {
        self.inner
            .entry(user_id.to_string())
            .or_insert_with(|| RwLock::new(Vec::new()))
            .write()
            .expect("pending delivery lock poisoned")
            .push(payload);
    }

    /// Read-all-then-delete in one step ("pops atomically"). An
    /// absent or empty key both return an empty Vec.
    pub fn drain(&self, user_id: &str) -> Vec<Value> {
        self.inner
            .remove(user_id)
            .map(|(_, lock)| lock.into_inner().expect("pending delivery lock poisoned"))
            .unwrap_or_default()
    }

    pub fn len(&self, user_id: &str) -> usize {
        self.inner
            .get(user_id)
            .map(|v| v.read().expect("pending delivery lock poisoned").len())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> std::collections::HashMap<String, Vec<Value>> {
        self.inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().read().expect("pending delivery lock poisoned").clone(),
                )
            })
            .collect()
    }

    pub fn restore(&self, snapshot: std::collections::HashMap<String, Vec<Value>>) {
        for (user_id, payloads) in snapshot {
            self.inner.insert(user_id, RwLock::new(payloads));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_then_drain_returns_in_order_and_clears() {
        let q = PendingDeliveryQueue::new();
        q.push("u1", json!({"event": "reminder_fired", "reminder_id": "r1"}));
        q.push("u1", json!({"event": "reminder_fired", "reminder_id": "r2"}));

        let drained = q.drain("u1");
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0]["reminder_id"], "r1");
        assert_eq!(q.len("u1"), 0);
    }

    #[test]
    fn drain_on_unknown_user_is_empty() {
        let q = PendingDeliveryQueue::new();
        assert!(q.drain("ghost").is_empty());
    }

    #[test]
    fn snapshot_and_restore_round_trip() {
        let q = PendingDeliveryQueue::new();
        q.push("u1", json!({"a": 1}));
        let snap = q.snapshot();

        let q2 = PendingDeliveryQueue::new();
        q2.restore(snap);
        assert_eq!(q2.len("u1"), 1);
    }
}
