use crate::chat_index::ChatIndex;
use crate::drafts::DraftCache;
use crate::messages::MessageCache;
use crate::pending_delivery::PendingDeliveryQueue;
use crate::reminders::ReminderSchedule;
use crate::versions::VersionStore;
use openmates_core::config::HotCacheConfig;
use openmates_core::Result;
use std::path::PathBuf;
use tracing::{info, instrument};

/// The single in-process authority for every in-memory key space: chat
/// versions, recency ordering, warm message lists, drafts, reminders, and
/// pending deliveries. Grouped one level down from `AppState` so the whole
/// thing can be handed around as one `Arc` without each crate needing to
/// know the others' field names.
pub struct HotCache {
    pub versions: VersionStore,
    pub chat_index: ChatIndex,
    pub messages: MessageCache,
    pub drafts: DraftCache,
    pub reminders: ReminderSchedule,
    pub pending_deliveries: PendingDeliveryQueue,
    pub top_n: usize,
    spill_path: PathBuf,
}

impl HotCache {
    pub fn new(config: &HotCacheConfig) -> Self {
        Self {
            versions: VersionStore::new(),
            chat_index: ChatIndex::new(),
            messages: MessageCache::new(),
            drafts: DraftCache::new(),
            reminders: ReminderSchedule::new(),
            pending_deliveries: PendingDeliveryQueue::new(),
            top_n: config.top_n,
            spill_path: PathBuf::from(&config.spill_dir).join("hotcache-spill.json"),
        }
    }

    /// Rehydrates reminders and pending deliveries from the last graceful
    /// shutdown's spill file, if any ("Spill/restore").
    #[instrument(skip(self))]
    pub fn restore_from_spill(&self, now_millis: i64) -> Result<()> {
        let snapshot = crate::spill::load_and_consume(&self.spill_path, now_millis)?;
        let reminder_count = snapshot.reminders.len();
        for reminder in snapshot.reminders {
            self.reminders.insert(reminder);
        }
        self.pending_deliveries.restore(snapshot.pending_deliveries);
        info!(reminder_count, "rehydrated hotcache state from spill file");
        Ok(())
    }

    /// Serializes reminders and pending deliveries to disk (,
    /// invoked from the shutdown drain sequence ).
    #[instrument(skip(self))]
    pub fn spill(&self, now_millis: i64) -> Result<()> {
        let reminders = self.reminders.all();
        let pending = self.pending_deliveries.snapshot();
        info!(
            reminder_count = reminders.len(),
            pending_user_count = pending.len(),
            "spilling hotcache state to disk"
        );
        crate::spill::save(&self.spill_path, reminders, pending, now_millis)
    }

    /// Whether `chat_id` currently belongs to `user_id`'s Top-N chats —
    /// the boundary that decides warm vs. evicted message state ("Top-N
    /// cache maintenance").
    pub fn is_top_n(&self, user_id: &str, chat_id: &str) -> bool {
        match self.chat_index.rank_of(user_id, chat_id) {
            Some(rank) => rank < self.top_n,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmates_core::types::now_millis;

    fn test_config() -> HotCacheConfig {
        HotCacheConfig {
            top_n: 2,
            reminder_ttl_days: 7,
            pending_delivery_ttl_days: 60,
            spill_dir: std::env::temp_dir()
                .join(format!("hotcache-test-{}", std::process::id()))
                .to_string_lossy()
                .to_string(),
        }
    }

    #[test]
    fn is_top_n_respects_configured_width() {
        let cache = HotCache::new(&test_config());
        cache.chat_index.update_score("u1", "c1", 300);
        cache.chat_index.update_score("u1", "c2", 200);
        cache.chat_index.update_score("u1", "c3", 100);

        assert!(cache.is_top_n("u1", "c1"));
        assert!(cache.is_top_n("u1", "c2"));
        assert!(!cache.is_top_n("u1", "c3"));
    }

    #[test]
    fn spill_then_restore_round_trips_reminders() {
        let config = test_config();
        let cache = HotCache::new(&config);
        cache.reminders.insert(crate::types::Reminder {
            reminder_id: "r1".to_string(),
            user_id: "u1".to_string(),
            trigger_at: now_millis(),
            encrypted_prompt: "ct".to_string(),
            status: openmates_core::types::ReminderStatus::Pending,
            occurrence_count: 0,
            recurrence: None,
        });

        let now = now_millis();
        cache.spill(now).unwrap();

        let restored = HotCache::new(&config);
        restored.restore_from_spill(now).unwrap();
        assert!(!restored.reminders.is_empty());
        let _ = std::fs::remove_dir_all(&config.spill_dir);
    }

    /// P6: a reminder fired while its user has zero live sessions survives
    /// a graceful shutdown (spill) followed by a fresh-process restore, and
    /// the user's pending-delivery queue still holds it afterward.
    #[test]
    fn p6_pending_delivery_survives_spill_and_restore() {
        let config = test_config();
        let cache = HotCache::new(&config);
        cache
            .pending_deliveries
            .push("u2", serde_json::json!({"event": "reminder_fired", "reminder_id": "r9"}));

        let now = now_millis();
        cache.spill(now).unwrap();

        let restored = HotCache::new(&config);
        restored.restore_from_spill(now).unwrap();
        assert_eq!(restored.pending_deliveries.len("u2"), 1);
        let _ = std::fs::remove_dir_all(&config.spill_dir);
    }
}
