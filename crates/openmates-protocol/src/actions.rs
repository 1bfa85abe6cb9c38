//! Typed payloads for each recognized inbound `type` (action set).
//! Unknown `type` values are rejected before reaching any of these —
//! dynamic/open-world decoding is never attempted.

use serde::{Deserialize, Serialize};

pub const UPDATE_TITLE: &str = "update_title";
pub const UPDATE_DRAFT: &str = "update_draft";
pub const APPEND_MESSAGE: &str = "append_message";
pub const SYNC_OFFLINE_CHANGES: &str = "sync_offline_changes";
pub const CONNECT: &str = "connect";

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTitlePayload {
    pub chat_id: String,
    pub encrypted_title: String,
    pub based_on_version: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDraftPayload {
    pub chat_id: String,
    /// `null` clears the draft — a valid edit, not a malformed one.
    pub encrypted_draft_md: Option<String>,
    pub based_on_version: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireMessage {
    pub message_id: String,
    pub encrypted_content: String,
    pub sender_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppendMessagePayload {
    pub chat_id: String,
    pub message: WireMessage,
}

/// One entry in an offline-replay batch.
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineChange {
    pub chat_id: String,
    #[serde(rename = "type")]
    pub change_type: OfflineChangeType,
    pub new_value: Option<String>,
    pub version_before_edit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfflineChangeType {
    Title,
    Draft,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncOfflineChangesPayload {
    pub changes: Vec<OfflineChange>,
}

/// Result summary sent back to the originating device only.
#[derive(Debug, Clone, Serialize)]
pub struct OfflineSyncComplete {
    pub processed: u32,
    pub conflicts: u32,
    pub errors: u32,
}
