//! Per-user durable FIFO replay for events emitted while a user had no live
//! session.
//!
//! Events are queued opaquely as JSON by whichever component couldn't
//! deliver them synchronously (today, only `openmates-reminders`). This
//! crate's one job is the replay side: atomically drain a user's queue and
//! hand the payloads to the connection layer on that user's next
//! `Subscribed` transition, the same drain-on-read shape as a notification
//! inbox.

use std::sync::Arc;

use openmates_hotcache::HotCache;
use serde_json::Value;
use tracing::instrument;

pub struct PendingDeliveryReplayer {
    cache: Arc<HotCache>,
}

impl PendingDeliveryReplayer {
    pub fn new(cache: Arc<HotCache>) -> Self {
        Self { cache }
    }

    /// Atomically drains and returns every queued payload for `user_id`.
    /// An absent or empty queue both return an empty `Vec` — there is no
    /// "no queue" error case, only "nothing to replay".
    #[instrument(skip(self))]
    pub fn replay(&self, user_id: &str) -> Vec<Value> {
        let payloads = self.cache.pending_deliveries.drain(user_id);
        tracing::info!(user_id, count = payloads.len(), "replayed pending deliveries");
        payloads
    }

    /// Number of payloads currently queued for `user_id`, without draining.
    pub fn pending_count(&self, user_id: &str) -> usize {
        self.cache.pending_deliveries.len(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmates_core::config::HotCacheConfig;

    fn config() -> HotCacheConfig {
        HotCacheConfig {
            top_n: 20,
            reminder_ttl_days: 7,
            pending_delivery_ttl_days: 60,
            spill_dir: std::env::temp_dir()
                .join(format!("pendingdelivery-test-{}", std::process::id()))
                .to_string_lossy()
                .to_string(),
        }
    }

    #[test]
    fn replay_drains_in_fifo_order_and_empties_the_queue() {
        let cache = Arc::new(HotCache::new(&config()));
        cache.pending_deliveries.push("u1", serde_json::json!({"event": "reminder_fired", "seq": 1}));
        cache.pending_deliveries.push("u1", serde_json::json!({"event": "reminder_fired", "seq": 2}));
        let replayer = PendingDeliveryReplayer::new(cache.clone());

        let replayed = replayer.replay("u1");

        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0]["seq"], 1);
        assert_eq!(replayer.pending_count("u1"), 0);
    }

    #[test]
    fn replay_on_unknown_user_is_empty_not_an_error() {
        let cache = Arc::new(HotCache::new(&config()));
        let replayer = PendingDeliveryReplayer::new(cache);
        assert!(replayer.replay("ghost").is_empty());
    }
}
