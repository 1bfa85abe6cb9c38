use serde::{Deserialize, Serialize};

/// Client → Server: authentication request, the `connect` action payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectPayload {
    pub token: String,
    pub device_fingerprint_hash: String,
}

/// Server → Client: successful auth response, sent as an `connected` event.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectedAck {
    pub protocol: u32,
    pub user_id: String,
    /// Version vectors for every chat warmed for this user at connect time,
    /// keyed by `chat_id`.
    pub chats: Vec<ChatSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSnapshot {
    pub chat_id: String,
    pub title_v: u64,
    pub draft_v: u64,
    pub messages_v: u64,
    pub last_edited_overall_timestamp: i64,
}
