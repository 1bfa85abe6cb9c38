use crate::types::Reminder;
use dashmap::DashMap;
use openmates_core::types::ReminderStatus;
use std::collections::BTreeSet;
use std::sync::RwLock;

/// `reminders:schedule` — sorted set by `trigger_at`, backing
/// `ReminderEngine`'s periodic due-reminder poll.
/// Reminder bodies live in `by_id`; `order` is the `(trigger_at, id)` index
/// that makes due-reminder scans O(log n + k) instead of a full scan.
#[derive(Default)]
pub struct ReminderSchedule {
    by_id: DashMap<String, Reminder>,
    order: RwLock<BTreeSet<(i64, String)>>,
}

impl ReminderSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reminder: Reminder) {
        let key = (reminder.trigger_at, reminder.reminder_id.clone());
        self.order.write().expect("schedule lock poisoned").insert(key);
        self.by_id.insert(reminder.reminder_id.clone(), reminder);
    }

    pub fn get(&self, reminder_id: &str) -> Option<Reminder> {
        self.by_id.get(reminder_id).map(|r| r.clone())
    }

    /// Every reminder with `trigger_at <= now` and `status == Pending`.
    pub fn due(&self, now_millis: i64) -> Vec<Reminder> {
        let order = self.order.read().expect("schedule lock poisoned");
        order
            .iter()
            .take_while(|(trigger_at, _)| *trigger_at <= now_millis)
            .filter_map(|(_, id)| self.by_id.get(id))
            .filter(|r| r.status == ReminderStatus::Pending)
            .map(|r| r.clone())
            .collect()
    }

    /// Atomically transitions `pending -> fired` (step 1).
    /// Returns `false` if the reminder was not `pending` (already fired,
    /// cancelled, or unknown) — the caller must not re-fire it.
    pub fn try_mark_fired(&self, reminder_id: &str) -> bool {
        match self.by_id.get_mut(reminder_id) {
            Some(mut entry) if entry.status == ReminderStatus::Pending => {
                entry.status = ReminderStatus::Fired;
                entry.occurrence_count += 1;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self, reminder_id: &str) {
        if let Some(mut entry) = self.by_id.get_mut(reminder_id) {
            entry.status = ReminderStatus::Cancelled;
        }
    }

    /// Re-arms a recurring reminder at a new `trigger_at` (crash-recovery
    /// path, failure model).
    pub fn rearm(&self, reminder_id: &str, next_trigger_at: i64) {
        if let Some(mut entry) = self.by_id.get_mut(reminder_id) {
            let old_key = (entry.trigger_at, reminder_id.to_string());
            self.order.write().expect("schedule lock poisoned").remove(&old_key);
            entry.trigger_at = next_trigger_at;
            entry.status = ReminderStatus::Pending;
            let new_key = (next_trigger_at, reminder_id.to_string());
            self.order.write().expect("schedule lock poisoned").insert(new_key);
        }
    }

    /// All reminders in `Fired` state — used by startup recovery to find
    /// ones a crash interrupted mid-delivery (failure model).
    pub fn fired(&self) -> Vec<Reminder> {
        self.by_id
            .iter()
            .filter(|r| r.status == ReminderStatus::Fired)
            .map(|r| r.clone())
            .collect()
    }

    pub fn all(&self) -> Vec<Reminder> {
        self.by_id.iter().map(|r| r.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
