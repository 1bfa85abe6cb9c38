// Verify wire frames match what OpenMates clients expect.

use openmates_protocol::actions::{
    AppendMessagePayload, OfflineChangeType, SyncOfflineChangesPayload, UpdateTitlePayload,
    APPEND_MESSAGE, UPDATE_TITLE,
};
use openmates_protocol::frames::{ErrorFrame, EventFrame, InboundFrame, VersionVectorWire};
use openmates_protocol::handshake::ConnectPayload;

#[test]
fn inbound_frame_parses_type_and_payload() {
    let json = r#"{"type":"update_title","payload":{"chat_id":"c1","encrypted_title":"CT_A","based_on_version":3}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, UPDATE_TITLE);

    let payload: UpdateTitlePayload = serde_json::from_value(frame.payload).unwrap();
    assert_eq!(payload.chat_id, "c1");
    assert_eq!(payload.based_on_version, 3);
}

#[test]
fn append_message_payload_round_trip() {
    let json = r#"{"type":"append_message","payload":{"chat_id":"c1","message":{"message_id":"m1","encrypted_content":"CT","sender_name":"alice"}}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, APPEND_MESSAGE);

    let payload: AppendMessagePayload = serde_json::from_value(frame.payload).unwrap();
    assert_eq!(payload.message.message_id, "m1");
}

#[test]
fn sync_offline_changes_parses_mixed_batch() {
    let json = r#"{"type":"sync_offline_changes","payload":{"changes":[
        {"chat_id":"c2","type":"title","new_value":"T1","version_before_edit":7},
        {"chat_id":"c2","type":"draft","new_value":null,"version_before_edit":2}
    ]}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    let payload: SyncOfflineChangesPayload = serde_json::from_value(frame.payload).unwrap();
    assert_eq!(payload.changes.len(), 2);
    assert_eq!(payload.changes[0].change_type, OfflineChangeType::Title);
    assert_eq!(payload.changes[1].change_type, OfflineChangeType::Draft);
    assert!(payload.changes[1].new_value.is_none());
}

#[test]
fn event_frame_serializes_versions_and_timestamp() {
    let versions = VersionVectorWire {
        title_v: Some(4),
        draft_v: None,
        messages_v: None,
    };
    let ev = EventFrame::new("chat_title_updated")
        .with_chat("c1")
        .with_versions(versions)
        .with_timestamp(1_700_000_000_000);
    let json = serde_json::to_string(&ev).unwrap();

    assert!(json.contains(r#""event":"chat_title_updated""#));
    assert!(json.contains(r#""chat_id":"c1""#));
    assert!(json.contains(r#""title_v":4"#));
    assert!(!json.contains("draft_v"));
}

#[test]
fn error_frame_carries_kind_and_chat_id() {
    let err = ErrorFrame::new("VersionConflict", "stale version").with_chat("c1");
    let json = serde_json::to_string(&err).unwrap();

    assert!(json.contains(r#""type":"error""#));
    assert!(json.contains(r#""kind":"VersionConflict""#));
    assert!(json.contains(r#""chat_id":"c1""#));
}

#[test]
fn connect_payload_parses_token_and_fingerprint() {
    let json = r#"{"token":"secret-123","device_fingerprint_hash":"fp1"}"#;
    let parsed: ConnectPayload = serde_json::from_str(json).unwrap();
    assert_eq!(parsed.token, "secret-123");
    assert_eq!(parsed.device_fingerprint_hash, "fp1");
}

#[test]
fn inbound_frame_unknown_type_is_not_special_cased() {
    // Unknown `type` values parse fine at the frame layer — rejection happens
    // one layer up, in the dispatch match against the known action set.
    let json = r#"{"type":"not_a_real_action","payload":{}}"#;
    let frame: InboundFrame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, "not_a_real_action");
}
