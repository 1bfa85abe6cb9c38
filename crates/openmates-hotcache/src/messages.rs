use crate::types::CachedMessage;
use dashmap::DashMap;
use std::sync::RwLock;

fn key(user_id: &str, chat_id: &str) -> String {
    format!("{user_id}:{chat_id}")
}

/// `user:{user_id}:chat:{chat_id}:messages` — warmed only for chats
/// currently in the user's Top N ("Top-N cache
/// maintenance"). Absence of a key means cold, not empty.
#[derive(Default)]
pub struct MessageCache {
    inner: DashMap<String, RwLock<Vec<CachedMessage>>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_warm(&self, user_id: &str, chat_id: &str) -> bool {
        self.inner.contains_key(&key(user_id, chat_id))
    }

    /// Read-through warm: replaces whatever is cached with `messages`
    /// ("PersistenceWorker enqueues a read-through warm").
    pub fn warm(&self, user_id: &str, chat_id: &str, messages: Vec<CachedMessage>) {
        self.inner
            .insert(key(user_id, chat_id), RwLock::new(messages));
    }

    /// Evicts a chat dropping out of Top N.
    pub fn evict(&self, user_id: &str, chat_id: &str) {
        self.inner.remove(&key(user_id, chat_id));
    }

    pub fn get(&self, user_id: &str, chat_id: &str) -> Option<Vec<CachedMessage>> {
        self.inner
            .get(&key(user_id, chat_id))
            .map(|v| v.read().expect("message lock poisoned").clone())
    }

    /// Appends a message to an already-warm chat. No-op if cold — a cold
    /// chat's messages are read through MetadataStore on the next warm,
    /// not accumulated incrementally.
    pub fn append(&self, user_id: &str, chat_id: &str, message: CachedMessage) {
        if let Some(entries) = self.inner.get(&key(user_id, chat_id)) {
            entries.write().expect("message lock poisoned").push(message);
        }
    }
}
