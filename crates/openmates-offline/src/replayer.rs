use std::sync::Arc;

use openmates_core::limits::{DRAFT_MAX_CIPHERTEXT_BYTES, TITLE_MAX_CIPHERTEXT_BYTES};
use openmates_core::types::{now_millis, VersionComponent};
use openmates_hotcache::types::CachedDraft;
use openmates_hotcache::HotCache;
use openmates_protocol::actions::{OfflineChange, OfflineChangeType, OfflineSyncComplete};
use openmates_protocol::frames::{EventFrame, VersionVectorWire};
use openmates_version::{VersionEngine, WriteOutcome};
use tracing::{instrument, warn};

use crate::sink::{Broadcaster, PersistenceQueue};

enum Outcome {
    Accepted,
    Conflict,
    Error,
}

/// Applies a reconnecting device's queued offline edits against the same
/// version-conflict rule live writes use. Titles and drafts both arrive as ciphertext
/// already produced client-side — the same as the live `update_title`/
/// `update_draft` actions — so this never decrypts anything; it only
/// enforces the ciphertext-size surrogate bound from `openmates-core::limits`
/// before handing the value to HotCache and persistence.
pub struct OfflineReplayer {
    version_engine: Arc<VersionEngine>,
    cache: Arc<HotCache>,
    broadcaster: Arc<dyn Broadcaster>,
    persistence: Arc<dyn PersistenceQueue>,
}

impl OfflineReplayer {
    pub fn new(
        version_engine: Arc<VersionEngine>,
        cache: Arc<HotCache>,
        broadcaster: Arc<dyn Broadcaster>,
        persistence: Arc<dyn PersistenceQueue>,
    ) -> Self {
        Self {
            version_engine,
            cache,
            broadcaster,
            persistence,
        }
    }

    /// Ordering: changes are applied in the order given; a conflict or
    /// error on one change never halts the rest of the batch — the batch
    /// is not atomic end-to-end.
    #[instrument(skip(self, changes), fields(user_id, device_id = %originating_device_id, batch_len = changes.len()))]
    pub fn replay_batch(
        &self,
        user_id: &str,
        originating_device_id: &str,
        changes: Vec<OfflineChange>,
    ) -> OfflineSyncComplete {
        let mut processed = 0;
        let mut conflicts = 0;
        let mut errors = 0;

        for change in &changes {
            match self.apply_one(user_id, originating_device_id, change) {
                Outcome::Accepted => processed += 1,
                Outcome::Conflict => conflicts += 1,
                Outcome::Error => errors += 1,
            }
        }

        OfflineSyncComplete {
            processed,
            conflicts,
            errors,
        }
    }

    fn apply_one(&self, user_id: &str, originating_device_id: &str, change: &OfflineChange) -> Outcome {
        let component = match change.change_type {
            OfflineChangeType::Title => VersionComponent::Title,
            OfflineChangeType::Draft => VersionComponent::Draft,
        };

        // A title always needs real content; a draft's `new_value: null` is
        // a valid edit — the client clearing it — not a malformed one.
        let new_value = change.new_value.as_deref();
        if new_value.is_none() && change.change_type == OfflineChangeType::Title {
            warn!(chat_id = %change.chat_id, "offline title change missing new_value");
            return Outcome::Error;
        }

        if let Some(value) = new_value {
            if !within_ciphertext_bound(change.change_type, value) {
                warn!(chat_id = %change.chat_id, ?change.change_type, "offline change exceeds ciphertext size bound");
                return Outcome::Error;
            }
        }

        let outcome = self.version_engine.check_and_increment(
            user_id,
            &change.chat_id,
            component,
            change.version_before_edit,
        );

        let new_version = match outcome {
            WriteOutcome::Rejected { .. } => return Outcome::Conflict,
            WriteOutcome::Accepted { new_version } => new_version,
        };

        let now = now_millis();
        match change.change_type {
            OfflineChangeType::Title => {
                // `new_value` is guaranteed `Some` here: a `None` title was
                // already rejected above.
                let title = new_value.expect("title change without new_value").to_string();
                self.persistence.enqueue_title(&change.chat_id, title, new_version);
                let event = EventFrame::new("chat_title_updated")
                    .with_chat(change.chat_id.clone())
                    .with_versions(VersionVectorWire {
                        title_v: Some(new_version),
                        ..Default::default()
                    })
                    .with_timestamp(now);
                self.broadcaster
                    .broadcast_except_device(user_id, originating_device_id, event);
            }
            OfflineChangeType::Draft => {
                let draft = new_value.map(|v| v.to_string());
                self.cache.drafts.put(
                    user_id,
                    &change.chat_id,
                    CachedDraft {
                        encrypted_draft_md: draft.clone(),
                        draft_v: new_version,
                    },
                );
                self.persistence.enqueue_draft(user_id, &change.chat_id, draft, new_version);
                let event = EventFrame::new("chat_draft_updated")
                    .with_chat(change.chat_id.clone())
                    .with_versions(VersionVectorWire {
                        draft_v: Some(new_version),
                        ..Default::default()
                    })
                    .with_timestamp(now);
                self.broadcaster
                    .broadcast_except_device(user_id, originating_device_id, event);
            }
        }

        Outcome::Accepted
    }
}

fn within_ciphertext_bound(change_type: OfflineChangeType, ciphertext: &str) -> bool {
    let bound = match change_type {
        OfflineChangeType::Title => TITLE_MAX_CIPHERTEXT_BYTES,
        OfflineChangeType::Draft => DRAFT_MAX_CIPHERTEXT_BYTES,
    };
    ciphertext.len() <= bound
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmates_core::config::HotCacheConfig;
    use std::sync::Mutex;

    struct FakeBroadcaster {
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl Broadcaster for FakeBroadcaster {
        fn broadcast_except_device(&self, user_id: &str, exclude_device: &str, event: EventFrame) {
            self.calls
                .lock()
                .unwrap()
                .push((user_id.to_string(), exclude_device.to_string(), event.event));
        }
    }

    struct FakePersistence {
        titles: Mutex<Vec<(String, String, u64)>>,
        drafts: Mutex<Vec<(String, String, Option<String>, u64)>>,
    }

    impl PersistenceQueue for FakePersistence {
        fn enqueue_title(&self, chat_id: &str, encrypted_title: String, title_v: u64) {
            self.titles.lock().unwrap().push((chat_id.to_string(), encrypted_title, title_v));
        }
        fn enqueue_draft(&self, user_id: &str, chat_id: &str, encrypted_draft_md: Option<String>, draft_v: u64) {
            self.drafts
                .lock()
                .unwrap()
                .push((user_id.to_string(), chat_id.to_string(), encrypted_draft_md, draft_v));
        }
    }

    fn harness() -> (OfflineReplayer, Arc<FakeBroadcaster>, Arc<FakePersistence>) {
        let config = HotCacheConfig {
            top_n: 10,
            reminder_ttl_days: 7,
            pending_delivery_ttl_days: 60,
            spill_dir: std::env::temp_dir()
                .join(format!("offline-replayer-test-{}", std::process::id()))
                .to_string_lossy()
                .to_string(),
        };
        let cache = Arc::new(HotCache::new(&config));
        let version_engine = Arc::new(VersionEngine::new(cache.clone()));
        let broadcaster = Arc::new(FakeBroadcaster { calls: Mutex::new(Vec::new()) });
        let persistence = Arc::new(FakePersistence {
            titles: Mutex::new(Vec::new()),
            drafts: Mutex::new(Vec::new()),
        });
        let replayer = OfflineReplayer::new(version_engine, cache, broadcaster.clone(), persistence.clone());
        (replayer, broadcaster, persistence)
    }

    fn change(chat_id: &str, change_type: OfflineChangeType, new_value: &str, version_before_edit: u64) -> OfflineChange {
        OfflineChange {
            chat_id: chat_id.to_string(),
            change_type,
            new_value: Some(new_value.to_string()),
            version_before_edit,
        }
    }

    fn change_null(chat_id: &str, change_type: OfflineChangeType, version_before_edit: u64) -> OfflineChange {
        OfflineChange {
            chat_id: chat_id.to_string(),
            change_type,
            new_value: None,
            version_before_edit,
        }
    }

    /// S4: stale title rejected, a draft clear (`new_value: null`) accepted,
    /// exactly one fan-out event, summary counts processed/conflicts/errors
    /// correctly.
    #[test]
    fn s4_offline_batch_mixed_conflict_and_accept() {
        let (replayer, broadcaster, persistence) = harness();

        // Pre-advance title_v to 9 so the offline title edit (based on 7) is stale.
        for _ in 0..9 {
            replayer
                .version_engine
                .check_and_increment("u3", "c2", VersionComponent::Title, u64::MAX);
        }
        // Draft starts at 2, matching the offline edit's version_before_edit.
        replayer
            .version_engine
            .check_and_increment("u3", "c2", VersionComponent::Draft, 0);

        let batch = vec![
            change("c2", OfflineChangeType::Title, "CT_T1", 7),
            change_null("c2", OfflineChangeType::Draft, 1),
        ];

        let summary = replayer.replay_batch("u3", "d3", batch);

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(broadcaster.calls.lock().unwrap().len(), 1);
        assert_eq!(persistence.drafts.lock().unwrap().len(), 1);
        assert_eq!(persistence.drafts.lock().unwrap()[0].2, None);
        assert!(persistence.titles.lock().unwrap().is_empty());
    }

    /// A null-new_value offline *title* change has nothing to apply and
    /// stays an error, unlike a draft's null.
    #[test]
    fn offline_title_change_with_null_new_value_is_an_error() {
        let (replayer, _broadcaster, _persistence) = harness();
        let summary = replayer.replay_batch("u1", "d1", vec![change_null("c1", OfflineChangeType::Title, 0)]);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.processed, 0);
    }

    #[test]
    fn oversized_ciphertext_counts_as_an_error_not_a_conflict() {
        let (replayer, _broadcaster, _persistence) = harness();
        let oversized = "x".repeat(TITLE_MAX_CIPHERTEXT_BYTES + 1);
        let summary = replayer.replay_batch("u1", "d1", vec![change("c1", OfflineChangeType::Title, &oversized, 0)]);

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.conflicts, 0);
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn accepted_draft_is_written_to_hotcache() {
        let (replayer, _broadcaster, _persistence) = harness();
        replayer.replay_batch("u1", "d1", vec![change("c1", OfflineChangeType::Draft, "CT_D", 0)]);

        let cached = replayer.cache.drafts.get("u1", "c1").unwrap();
        assert_eq!(cached.encrypted_draft_md, Some("CT_D".to_string()));
        assert_eq!(cached.draft_v, 1);
    }

    /// A draft change with `new_value: null` clears it in HotCache rather
    /// than erroring.
    #[test]
    fn null_draft_change_clears_hotcache_entry() {
        let (replayer, _broadcaster, _persistence) = harness();
        replayer.replay_batch("u1", "d1", vec![change("c1", OfflineChangeType::Draft, "CT_D", 0)]);
        let summary = replayer.replay_batch("u1", "d1", vec![change_null("c1", OfflineChangeType::Draft, 1)]);

        assert_eq!(summary.processed, 1);
        let cached = replayer.cache.drafts.get("u1", "c1").unwrap();
        assert_eq!(cached.encrypted_draft_md, None);
        assert_eq!(cached.draft_v, 2);
    }
}
