use crate::types::ChatIndexEntry;
use dashmap::DashMap;
use std::sync::RwLock;

/// `user:{user_id}:chat_index` — sorted set by `last_edited_overall_timestamp`.
/// Kept as a `Vec` sorted descending rather than a real sorted
/// set: per-user chat counts are small enough that a linear re-sort on
/// `update_score` is cheaper than a tree structure, and rank lookups
/// (`top_n`, `rank_of`) are simple slice operations.
#[derive(Default)]
pub struct ChatIndex {
    inner: DashMap<String, RwLock<Vec<ChatIndexEntry>>>,
}

impl ChatIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or moves `chat_id` to `ts`, keeping the list sorted newest
    /// first. This is the VersionEngine's `update_score` primitive.
    pub fn update_score(&self, user_id: &str, chat_id: &str, ts: i64) {
        let entries = self
            .inner
            .entry(user_id.to_string())
            .or_insert_with(|| RwLock::new(Vec::new()));
        let mut guard = entries.write().expect("chat index lock poisoned");
        guard.retain(|e| e.chat_id != chat_id);
        let pos = guard
            .iter()
            .position(|e| e.last_edited_overall_timestamp < ts)
            .unwrap_or(guard.len());
        guard.insert(
            pos,
            ChatIndexEntry {
                chat_id: chat_id.to_string(),
                last_edited_overall_timestamp: ts,
            },
        );
    }

    pub fn list(&self, user_id: &str) -> Vec<ChatIndexEntry> {
        match self.inner.get(user_id) {
            None => Vec::new(),
            Some(entries) => entries.read().expect("chat index lock poisoned").clone(),
        }
    }

    /// The top-N chat ids by recency, used to decide which chats stay
    /// warm in the message cache ("Top-N cache maintenance").
    pub fn top_n(&self, user_id: &str, n: usize) -> Vec<String> {
        self.list(user_id)
            .into_iter()
            .take(n)
            .map(|e| e.chat_id)
            .collect()
    }

    /// 0-based rank of `chat_id` in the user's index, if present.
    pub fn rank_of(&self, user_id: &str, chat_id: &str) -> Option<usize> {
        self.list(user_id).iter().position(|e| e.chat_id == chat_id)
    }

    pub fn remove_chat(&self, user_id: &str, chat_id: &str) {
        if let Some(entries) = self.inner.get(user_id) {
            entries
                .write()
                .expect("chat index lock poisoned")
                .retain(|e| e.chat_id != chat_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_score_orders_newest_first() {
        let idx = ChatIndex::new();
        idx.update_score("u1", "c1", 100);
        idx.update_score("u1", "c2", 200);
        idx.update_score("u1", "c3", 150);

        let ids: Vec<String> = idx.list("u1").into_iter().map(|e| e.chat_id).collect();
        assert_eq!(ids, vec!["c2", "c3", "c1"]);
    }

    #[test]
    fn update_score_moves_existing_entry_instead_of_duplicating() {
        let idx = ChatIndex::new();
        idx.update_score("u1", "c1", 100);
        idx.update_score("u1", "c2", 200);
        idx.update_score("u1", "c1", 300);

        let entries = idx.list("u1");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].chat_id, "c1");
    }

    #[test]
    fn top_n_truncates_to_requested_size() {
        let idx = ChatIndex::new();
        for i in 0..11 {
            idx.update_score("u1", &format!("c{i}"), i as i64);
        }
        let top = idx.top_n("u1", 10);
        assert_eq!(top.len(), 10);
        assert_eq!(top[0], "c10");
        assert!(!top.contains(&"c0".to_string()));
    }

    #[test]
    fn rank_of_reflects_recency_order() {
        let idx = ChatIndex::new();
        idx.update_score("u1", "c1", 100);
        idx.update_score("u1", "c2", 200);
        assert_eq!(idx.rank_of("u1", "c2"), Some(0));
        assert_eq!(idx.rank_of("u1", "c1"), Some(1));
        assert_eq!(idx.rank_of("u1", "ghost"), None);
    }
}
