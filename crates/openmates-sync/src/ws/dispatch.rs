//! Routes one decoded inbound frame to its handler (action set).
//! Unknown `type` values are rejected outright — there is no dynamic
//! method registry to fall through to.

use serde::Serialize;
use serde_json::Value;

use openmates_core::error::{OpenMatesError, Result};
use openmates_protocol::actions;
use openmates_protocol::frames::{AckFrame, ErrorFrame, EventFrame, InboundFrame};

use crate::app::AppState;
use crate::ws::handlers;
use crate::ws::handshake::DeviceSession;

/// Decodes and dispatches one text frame, returning the JSON value to send
/// back to the originating connection. Errors are mapped to `ErrorFrame`
/// rather than propagated, since there is always exactly one reply to send.
pub async fn handle(app: &AppState, session: &DeviceSession, text: &str) -> Value {
    match route(app, session, text).await {
        Ok(value) => value,
        Err(err) => to_value(&ErrorFrame::from_error(&err)),
    }
}

async fn route(app: &AppState, session: &DeviceSession, text: &str) -> Result<Value> {
    let frame: InboundFrame = serde_json::from_str(text).map_err(|e| OpenMatesError::Malformed(e.to_string()))?;

    match frame.frame_type.as_str() {
        actions::UPDATE_TITLE => {
            let payload = decode(frame.payload)?;
            let event = handlers::handle_update_title(app, session, payload).await?;
            Ok(to_value(&ack_for(event)))
        }
        actions::UPDATE_DRAFT => {
            let payload = decode(frame.payload)?;
            let event = handlers::handle_update_draft(app, session, payload).await?;
            Ok(to_value(&ack_for(event)))
        }
        actions::APPEND_MESSAGE => {
            let payload = decode(frame.payload)?;
            let event = handlers::handle_append_message(app, session, payload).await?;
            Ok(to_value(&ack_for(event)))
        }
        actions::SYNC_OFFLINE_CHANGES => {
            let payload = decode(frame.payload)?;
            let summary = handlers::handle_sync_offline_changes(app, session, payload).await?;
            Ok(to_value(&summary))
        }
        other => Err(OpenMatesError::Malformed(format!("unrecognized frame type '{other}'"))),
    }
}

/// The originating connection gets an ack, never the `EventFrame` itself —
/// that event already went to the user's other devices via
/// `broadcast_except_device`. Echoing it back to the sender too would
/// deliver a duplicate "someone else changed this" notification for the
/// sender's own write.
fn ack_for(event: EventFrame) -> AckFrame {
    AckFrame::new(event.chat_id.unwrap_or_default(), event.versions.unwrap_or_default())
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|e| OpenMatesError::Malformed(e.to_string()))
}

fn to_value(v: &impl Serialize) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::test_support::test_app;

    fn session(user_id: &str, conn_id: &str) -> DeviceSession {
        DeviceSession {
            user_id: user_id.to_string(),
            conn_id: conn_id.to_string(),
            device_fingerprint_hash: "fp1".to_string(),
        }
    }

    #[tokio::test]
    async fn update_title_frame_dispatches_to_its_handler() {
        let app = test_app().await;
        let session = session("u1", "c1");
        let text = serde_json::json!({
            "type": "update_title",
            "payload": { "chat_id": "chat1", "encrypted_title": "CT", "based_on_version": 0 }
        })
        .to_string();

        let response = handle(&app, &session, &text).await;
        assert_eq!(response["type"], "ack");
        assert_eq!(response["chat_id"], "chat1");
        assert_eq!(response["versions"]["title_v"], 1);
    }

    /// S1: the originating connection's own `update_title` reply is an ack,
    /// never the `chat_title_updated` event fanned out to other devices.
    #[tokio::test]
    async fn update_title_reply_to_sender_is_an_ack_not_the_fanout_event() {
        let app = test_app().await;
        let session = session("u1", "c1");
        let text = serde_json::json!({
            "type": "update_title",
            "payload": { "chat_id": "chat1", "encrypted_title": "CT", "based_on_version": 0 }
        })
        .to_string();

        let response = handle(&app, &session, &text).await;
        assert_ne!(response["type"], "error");
        assert!(response.get("event").is_none());
    }

    #[tokio::test]
    async fn unknown_frame_type_yields_an_error_frame() {
        let app = test_app().await;
        let session = session("u1", "c1");
        let text = serde_json::json!({ "type": "do_a_barrel_roll", "payload": {} }).to_string();

        let response = handle(&app, &session, &text).await;
        assert_eq!(response["type"], "error");
    }

    #[tokio::test]
    async fn malformed_json_yields_an_error_frame() {
        let app = test_app().await;
        let session = session("u1", "c1");
        let response = handle(&app, &session, "not json").await;
        assert_eq!(response["type"], "error");
    }
}
