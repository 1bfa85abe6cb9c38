use serde::{Deserialize, Serialize};

/// Durable row for the `chats` table (persisted layout). `draft_v`
/// is intentionally absent — it is per-(user, chat) and lives on the
/// matching `DraftRow`, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRow {
    pub id: String,
    pub user_id: String,
    pub encrypted_title: String,
    pub vault_key_id: String,
    pub title_v: u64,
    pub messages_v: u64,
    pub unread_count: i64,
    pub last_edited_overall_timestamp: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub encrypted_content: String,
    pub sender_name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftRow {
    pub id: String,
    pub chat_id: String,
    pub hashed_user_id: String,
    pub encrypted_content: String,
    pub version: u64,
    pub last_edited_timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub email_hash: String,
    pub encrypted_email: String,
    pub encrypted_username: String,
    pub vault_key_id: String,
    pub is_admin: bool,
    /// Encrypted list of known device fingerprints, opaque to the store.
    pub devices_encrypted: String,
}

/// Fields `update_chat_fields` may blindly overwrite. The caller is
/// responsible for version-guarding before calling this (:
/// "blind write; version guarded by caller").
#[derive(Debug, Clone, Default)]
pub struct ChatFieldUpdate {
    pub encrypted_title: Option<String>,
    pub title_v: Option<u64>,
    pub messages_v: Option<u64>,
    pub unread_count: Option<i64>,
    pub last_edited_overall_timestamp: Option<i64>,
}
