use crate::types::CachedDraft;
use dashmap::DashMap;
use std::sync::RwLock;

fn key(user_id: &str, chat_id: &str) -> String {
    format!("{user_id}:{chat_id}")
}

/// `user:{user_id}:chat:{chat_id}:draft` — latest encrypted draft plus
/// `draft_v`. `draft_v` here is the per-user component of the
/// chat's version vector; `VersionStore::increment` is the source of truth
/// for the counter, this cache only tracks the ciphertext alongside it.
#[derive(Default)]
pub struct DraftCache {
    inner: DashMap<String, RwLock<CachedDraft>>,
}

impl DraftCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, user_id: &str, chat_id: &str, draft: CachedDraft) {
        self.inner.insert(key(user_id, chat_id), RwLock::new(draft));
    }

    pub fn get(&self, user_id: &str, chat_id: &str) -> Option<CachedDraft> {
        self.inner
            .get(&key(user_id, chat_id))
            .map(|v| v.read().expect("draft lock poisoned").clone())
    }
}
