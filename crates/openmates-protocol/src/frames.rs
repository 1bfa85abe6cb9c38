use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → Server inbound frame.
/// Wire: `{ "type": "update_title", "payload": {...} }`
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Server → Client unsolicited event.
/// Wire: `{ "event": "chat_title_updated", "chat_id": "...", "data": {...}, "versions": {...} }`
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<VersionVectorWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_edited_overall_timestamp: Option<i64>,
}

impl EventFrame {
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            chat_id: None,
            data: None,
            versions: None,
            last_edited_overall_timestamp: None,
        }
    }

    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = Some(serde_json::to_value(data).unwrap_or(Value::Null));
        self
    }

    pub fn with_versions(mut self, versions: VersionVectorWire) -> Self {
        self.versions = Some(versions);
        self
    }

    pub fn with_timestamp(mut self, ts: i64) -> Self {
        self.last_edited_overall_timestamp = Some(ts);
        self
    }
}

/// The subset of `VersionVector` relevant to a given fan-out event; callers
/// only populate the component(s) that actually changed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VersionVectorWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_v: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_v: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_v: Option<u64>,
}

impl From<openmates_core::types::VersionVector> for VersionVectorWire {
    fn from(v: openmates_core::types::VersionVector) -> Self {
        Self {
            title_v: Some(v.title_v),
            draft_v: Some(v.draft_v),
            messages_v: Some(v.messages_v),
        }
    }
}

/// Server → Client acknowledgement of its own write. Carries the new
/// version(s) so the sender can update its local state, but never the
/// event payload — that only goes to the user's *other* devices as an
/// `EventFrame`, so the sender never sees its own write echoed back.
/// Wire: `{ "type": "ack", "chat_id": "...", "versions": {...} }`
#[derive(Debug, Clone, Serialize)]
pub struct AckFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub chat_id: String,
    pub versions: VersionVectorWire,
}

impl AckFrame {
    pub fn new(chat_id: impl Into<String>, versions: VersionVectorWire) -> Self {
        Self {
            frame_type: "ack",
            chat_id: chat_id.into(),
            versions,
        }
    }
}

/// Server → Client error frame.
/// Wire: `{ "type": "error", "payload": { "kind": "VersionConflict", "message": "...", "chat_id": "..." } }`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub payload: ErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl ErrorFrame {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            frame_type: "error",
            payload: ErrorPayload {
                kind,
                message: message.into(),
                chat_id: None,
            },
        }
    }

    pub fn with_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.payload.chat_id = Some(chat_id.into());
        self
    }

    pub fn from_error(err: &openmates_core::error::OpenMatesError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}
