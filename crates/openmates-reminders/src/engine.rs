use std::sync::Arc;
use std::time::Duration;

use openmates_core::types::now_millis;
use openmates_hotcache::types::Reminder;
use openmates_hotcache::HotCache;
use openmates_protocol::frames::EventFrame;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::connectivity::Connectivity;
use crate::recurrence::{next_trigger_at, Recurrence};

/// `reminder_fired` event payload, forwarded opaquely — `encrypted_prompt`
/// is never decrypted at this layer; the client owns decryption of reminder
/// content after receipt.
#[derive(Debug, Serialize)]
struct ReminderFiredData {
    reminder_id: String,
    encrypted_prompt: String,
    occurrence_count: u32,
}

/// Polls `HotCache`'s reminder sorted set and fires due reminders: a
/// fixed-period tick loop raced against a shutdown `watch` channel, with a
/// startup recovery pass for anything a crash left in `Fired`. There is no
/// separate job-management handle — `HotCache::reminders` is the single
/// read/write surface and is already safe to share across tasks via `Arc`.
pub struct ReminderEngine {
    cache: Arc<HotCache>,
    connectivity: Arc<dyn Connectivity>,
    tick_interval: Duration,
}

impl ReminderEngine {
    pub fn new(cache: Arc<HotCache>, connectivity: Arc<dyn Connectivity>, tick_interval_ms: u64) -> Self {
        Self {
            cache,
            connectivity,
            tick_interval: Duration::from_millis(tick_interval_ms),
        }
    }

    /// Main loop. Ticks until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("reminder engine started");
        self.recover_on_startup();

        let mut interval = tokio::time::interval(self.tick_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(now_millis());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Failure model : a crash between "mark fired" and "re-arm"
    /// leaves a reminder stuck in `Fired`. Recurring reminders re-arm based
    /// on `occurrence_count`; a one-shot `Fired` reminder with no matching
    /// pending-delivery record for its user is assumed to have been
    /// delivered already (or is unrecoverable) and is only audit-logged.
    #[instrument(skip(self))]
    fn recover_on_startup(&self) {
        for reminder in self.cache.reminders.fired() {
            let recurrence = reminder.recurrence.as_deref().and_then(Recurrence::from_stored);
            match recurrence {
                Some(recurrence) => match next_trigger_at(recurrence, reminder.trigger_at) {
                    Some(next) => {
                        self.cache.reminders.rearm(&reminder.reminder_id, next);
                        info!(reminder_id = %reminder.reminder_id, "re-armed fired recurring reminder on startup");
                    }
                    None => warn!(reminder_id = %reminder.reminder_id, "recurring reminder could not compute a next trigger time"),
                },
                None => {
                    if !self.has_matching_delivery_record(&reminder) {
                        warn!(
                            reminder_id = %reminder.reminder_id,
                            user_id = %reminder.user_id,
                            "fired non-recurring reminder without matching delivery record"
                        );
                    }
                }
            }
        }
    }

    fn has_matching_delivery_record(&self, reminder: &Reminder) -> bool {
        self.cache
            .pending_deliveries
            .snapshot()
            .get(&reminder.user_id)
            .is_some_and(|payloads| {
                payloads
                    .iter()
                    .any(|p| p["data"]["reminder_id"] == Value::String(reminder.reminder_id.clone()))
            })
    }

    fn tick(&self, now: i64) {
        for reminder in self.cache.reminders.due(now) {
            self.fire(reminder, now);
        }
    }

    /// Steps 1-4 of for a single due reminder.
    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.reminder_id))]
    fn fire(&self, reminder: Reminder, now: i64) {
        // Step 1: atomic pending -> fired. A `false` here means another
        // tick (or a racing recovery pass) already claimed it.
        if !self.cache.reminders.try_mark_fired(&reminder.reminder_id) {
            return;
        }

        let event = EventFrame::new("reminder_fired")
            .with_data(ReminderFiredData {
                reminder_id: reminder.reminder_id.clone(),
                encrypted_prompt: reminder.encrypted_prompt.clone(),
                occurrence_count: reminder.occurrence_count,
            })
            .with_timestamp(now);

        // Step 3-4: route to a live session or queue for later delivery.
        if self.connectivity.is_connected(&reminder.user_id) {
            self.connectivity.broadcast(&reminder.user_id, event);
        } else {
            let payload = serde_json::to_value(&event).unwrap_or(Value::Null);
            self.cache.pending_deliveries.push(&reminder.user_id, payload);
            // Non-core: an actual email/push hook lives outside this crate;
            // this is the seam a deployment wires one into.
            debug!(user_id = %reminder.user_id, "no live session; queued pending delivery and notified email hook");
        }

        // Step 4: re-arm recurring reminders from their own scheduled time,
        // not wall-clock `now`, so a late tick doesn't shift the cadence.
        if let Some(recurrence) = reminder.recurrence.as_deref().and_then(Recurrence::from_stored) {
            if let Some(next) = next_trigger_at(recurrence, reminder.trigger_at) {
                self.cache.reminders.rearm(&reminder.reminder_id, next);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmates_core::config::HotCacheConfig;
    use openmates_core::types::ReminderStatus;
    use std::sync::Mutex;

    struct FakeConnectivity {
        connected_users: Vec<String>,
        broadcasts: Mutex<Vec<(String, String)>>,
    }

    impl Connectivity for FakeConnectivity {
        fn is_connected(&self, user_id: &str) -> bool {
            self.connected_users.iter().any(|u| u == user_id)
        }

        fn broadcast(&self, user_id: &str, event: EventFrame) {
            self.broadcasts.lock().unwrap().push((user_id.to_string(), event.event));
        }
    }

    fn config() -> HotCacheConfig {
        HotCacheConfig {
            top_n: 20,
            reminder_ttl_days: 7,
            pending_delivery_ttl_days: 60,
            spill_dir: std::env::temp_dir()
                .join(format!("reminder-engine-test-{}", std::process::id()))
                .to_string_lossy()
                .to_string(),
        }
    }

    fn reminder(id: &str, user_id: &str, trigger_at: i64, recurrence: Option<Recurrence>) -> Reminder {
        Reminder {
            reminder_id: id.to_string(),
            user_id: user_id.to_string(),
            trigger_at,
            encrypted_prompt: "ct-prompt".to_string(),
            status: ReminderStatus::Pending,
            occurrence_count: 0,
            recurrence: recurrence.map(Recurrence::to_stored),
        }
    }

    #[test]
    fn due_reminder_for_connected_user_is_broadcast_not_queued() {
        let cache = Arc::new(HotCache::new(&config()));
        cache.reminders.insert(reminder("r1", "u1", 100, None));
        let connectivity = Arc::new(FakeConnectivity {
            connected_users: vec!["u1".to_string()],
            broadcasts: Mutex::new(Vec::new()),
        });
        let engine = ReminderEngine::new(cache.clone(), connectivity.clone(), 1000);

        engine.tick(200);

        assert_eq!(cache.reminders.get("r1").unwrap().status, ReminderStatus::Fired);
        assert_eq!(connectivity.broadcasts.lock().unwrap().len(), 1);
        assert_eq!(cache.pending_deliveries.len("u1"), 0);
    }

    #[test]
    fn due_reminder_for_disconnected_user_is_queued_for_pending_delivery() {
        let cache = Arc::new(HotCache::new(&config()));
        cache.reminders.insert(reminder("r1", "u2", 100, None));
        let connectivity = Arc::new(FakeConnectivity {
            connected_users: vec![],
            broadcasts: Mutex::new(Vec::new()),
        });
        let engine = ReminderEngine::new(cache.clone(), connectivity, 1000);

        engine.tick(200);

        assert_eq!(cache.pending_deliveries.len("u2"), 1);
    }

    #[test]
    fn recurring_reminder_re_arms_instead_of_staying_fired() {
        let cache = Arc::new(HotCache::new(&config()));
        cache.reminders.insert(reminder(
            "r1",
            "u1",
            100,
            Some(Recurrence::Interval { every_secs: 60 }),
        ));
        let connectivity = Arc::new(FakeConnectivity {
            connected_users: vec!["u1".to_string()],
            broadcasts: Mutex::new(Vec::new()),
        });
        let engine = ReminderEngine::new(cache.clone(), connectivity, 1000);

        engine.tick(200);

        let after = cache.reminders.get("r1").unwrap();
        assert_eq!(after.status, ReminderStatus::Pending);
        assert_eq!(after.trigger_at, 100 + 60_000);
        assert_eq!(after.occurrence_count, 1);
    }

    #[test]
    fn recovery_rearms_fired_recurring_reminder_left_by_a_crash() {
        let cache = Arc::new(HotCache::new(&config()));
        let mut stuck = reminder("r1", "u1", 100, Some(Recurrence::Interval { every_secs: 60 }));
        stuck.status = ReminderStatus::Fired;
        cache.reminders.insert(stuck);
        let connectivity = Arc::new(FakeConnectivity {
            connected_users: vec![],
            broadcasts: Mutex::new(Vec::new()),
        });
        let engine = ReminderEngine::new(cache.clone(), connectivity, 1000);

        engine.recover_on_startup();

        let recovered = cache.reminders.get("r1").unwrap();
        assert_eq!(recovered.status, ReminderStatus::Pending);
        assert_eq!(recovered.trigger_at, 160_000);
    }

    #[test]
    fn recovery_leaves_fired_one_shot_reminder_with_a_delivery_record_alone() {
        let cache = Arc::new(HotCache::new(&config()));
        let mut stuck = reminder("r1", "u1", 100, None);
        stuck.status = ReminderStatus::Fired;
        cache.reminders.insert(stuck);
        cache
            .pending_deliveries
            .push("u1", serde_json::json!({"event": "reminder_fired", "data": {"reminder_id": "r1"}}));
        let connectivity = Arc::new(FakeConnectivity {
            connected_users: vec![],
            broadcasts: Mutex::new(Vec::new()),
        });
        let engine = ReminderEngine::new(cache.clone(), connectivity, 1000);

        engine.recover_on_startup();

        assert_eq!(cache.reminders.get("r1").unwrap().status, ReminderStatus::Fired);
    }
}
