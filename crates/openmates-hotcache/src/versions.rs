use dashmap::DashMap;
use openmates_core::types::{VersionComponent, VersionVector};
use std::sync::RwLock;

/// `chat:{chat_id}:versions` — one hash per chat holding its version vector.
/// Increments are the VersionEngine's atomic primitive; this
/// struct only owns the storage, not the conflict rule.
#[derive(Default)]
pub struct VersionStore {
    inner: DashMap<String, RwLock<VersionVector>>,
}

impl VersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current vector, creating a fresh one (all zero) if the
    /// chat has never been seen.
    pub fn read(&self, chat_id: &str, now_millis: i64) -> VersionVector {
        *self
            .inner
            .entry(chat_id.to_string())
            .or_insert_with(|| RwLock::new(VersionVector::new(now_millis)))
            .read()
            .expect("version lock poisoned")
    }

    /// Atomically bumps `component` by one and returns the new value. The
    /// per-entry `RwLock` is the linearization point for keeping a single
    /// authoritative instance per chat.
    pub fn increment(&self, chat_id: &str, component: VersionComponent, now_millis: i64) -> u64 {
        let entry = self
            .inner
            .entry(chat_id.to_string())
            .or_insert_with(|| RwLock::new(VersionVector::new(now_millis)));
        let mut guard = entry.write().expect("version lock poisoned");
        let new_v = match component {
            VersionComponent::Title => {
                guard.title_v += 1;
                guard.title_v
            }
            VersionComponent::Draft => {
                guard.draft_v += 1;
                guard.draft_v
            }
            VersionComponent::Messages => {
                guard.messages_v += 1;
                guard.messages_v
            }
        };
        guard.last_edited_overall_timestamp = now_millis;
        new_v
    }

    /// Seeds or overwrites a chat's vector wholesale — used when warming
    /// from MetadataStore on first touch.
    pub fn seed(&self, chat_id: &str, vector: VersionVector) {
        self.inner
            .insert(chat_id.to_string(), RwLock::new(vector));
    }

    pub fn current_component(&self, chat_id: &str, component: VersionComponent) -> u64 {
        match self.inner.get(chat_id) {
            None => 0,
            Some(entry) => {
                let v = *entry.read().expect("version lock poisoned");
                match component {
                    VersionComponent::Title => v.title_v,
                    VersionComponent::Draft => v.draft_v,
                    VersionComponent::Messages => v.messages_v,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_bumps_only_the_targeted_component() {
        let store = VersionStore::new();
        store.increment("c1", VersionComponent::Title, 1_000);
        store.increment("c1", VersionComponent::Title, 1_001);
        store.increment("c1", VersionComponent::Messages, 1_002);

        let v = store.read("c1", 0);
        assert_eq!(v.title_v, 2);
        assert_eq!(v.messages_v, 1);
        assert_eq!(v.draft_v, 0);
        assert_eq!(v.last_edited_overall_timestamp, 1_002);
    }

    #[test]
    fn read_on_unknown_chat_creates_zeroed_vector() {
        let store = VersionStore::new();
        let v = store.read("ghost", 500);
        assert_eq!(v.title_v, 0);
        assert_eq!(v.last_edited_overall_timestamp, 500);
    }

    #[test]
    fn seed_overwrites_existing_vector() {
        let store = VersionStore::new();
        store.increment("c1", VersionComponent::Title, 0);
        store.seed(
            "c1",
            VersionVector {
                title_v: 9,
                draft_v: 2,
                messages_v: 4,
                last_edited_overall_timestamp: 42,
            },
        );
        let v = store.read("c1", 0);
        assert_eq!(v.title_v, 9);
        assert_eq!(v.draft_v, 2);
    }
}
