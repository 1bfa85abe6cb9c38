use openmates_core::types::ReminderStatus;
use serde::{Deserialize, Serialize};

/// One entry in a user's ordered chat index (
/// `user:{user_id}:chat_index`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatIndexEntry {
    pub chat_id: String,
    pub last_edited_overall_timestamp: i64,
}

/// Cached draft ciphertext for a single (user, chat) pair. `None` is a
/// cleared draft, not a missing one — the pair still has a cache entry and
/// a `draft_v`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDraft {
    pub encrypted_draft_md: Option<String>,
    pub draft_v: u64,
}

/// A warmed chat message, mirrors `openmates_protocol::actions::WireMessage`
/// without depending on the wire layer directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMessage {
    pub message_id: String,
    pub encrypted_content: String,
    pub sender_name: String,
}

/// A scheduled reminder (, reminder entity).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub reminder_id: String,
    pub user_id: String,
    pub trigger_at: i64,
    pub encrypted_prompt: String,
    pub status: ReminderStatus,
    pub occurrence_count: u32,
    pub recurrence: Option<String>,
}

/// Shutdown spill snapshot ("Spill/restore"). Reminders and
/// pending deliveries are the only state persisted outside MetadataStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpillSnapshot {
    pub spilled_at_millis: i64,
    pub reminders: Vec<Reminder>,
    pub pending_deliveries: std::collections::HashMap<String, Vec<serde_json::Value>>,
}
