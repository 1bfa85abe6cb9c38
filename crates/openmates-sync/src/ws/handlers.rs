//! Handlers for the four authenticated actions. Each returns
//! the frame(s) to send back to the originating connection; fan-out to
//! other devices happens as a side effect via `AppState::connections`.

use openmates_core::error::{OpenMatesError, Result};
use openmates_core::limits::{DRAFT_MAX_CIPHERTEXT_BYTES, TITLE_MAX_CIPHERTEXT_BYTES};
use openmates_core::types::{now_millis, VersionComponent};
use openmates_hotcache::types::{CachedDraft, CachedMessage};
use openmates_metadatastore::types::MessageRow;
use openmates_persistence::NewChat;
use openmates_protocol::actions::{
    AppendMessagePayload, OfflineSyncComplete, SyncOfflineChangesPayload, UpdateDraftPayload, UpdateTitlePayload,
};
use openmates_protocol::frames::{EventFrame, VersionVectorWire};
use openmates_version::WriteOutcome;
use tracing::instrument;

use crate::app::AppState;
use crate::ws::handshake::DeviceSession;

#[instrument(skip(app, payload), fields(chat_id = %payload.chat_id))]
pub async fn handle_update_title(app: &AppState, session: &DeviceSession, payload: UpdateTitlePayload) -> Result<EventFrame> {
    app.require_not_overloaded()?;
    if payload.encrypted_title.len() > TITLE_MAX_CIPHERTEXT_BYTES {
        return Err(OpenMatesError::SizeLimit {
            field: "encrypted_title".to_string(),
            size: payload.encrypted_title.len(),
            max: TITLE_MAX_CIPHERTEXT_BYTES,
        });
    }

    let outcome = app.version_engine.check_and_increment(
        &session.user_id,
        &payload.chat_id,
        VersionComponent::Title,
        payload.based_on_version,
    );
    let new_version = match outcome {
        WriteOutcome::Rejected { server_version } => {
            return Err(OpenMatesError::VersionConflict {
                chat_id: payload.chat_id,
                based_on_version: payload.based_on_version,
                server_version,
            });
        }
        WriteOutcome::Accepted { new_version } => new_version,
    };

    app.persistence
        .enqueue_title(&payload.chat_id, payload.encrypted_title.clone(), new_version);
    maintain_top_n(app, &session.user_id, &payload.chat_id);

    let now = now_millis();
    let event = EventFrame::new("chat_title_updated")
        .with_chat(payload.chat_id.clone())
        .with_data(serde_json::json!({ "encrypted_title": payload.encrypted_title }))
        .with_versions(VersionVectorWire {
            title_v: Some(new_version),
            ..Default::default()
        })
        .with_timestamp(now);
    app.connections
        .broadcast_except_device(&session.user_id, &session.conn_id, event.clone());
    Ok(event)
}

#[instrument(skip(app, payload), fields(chat_id = %payload.chat_id))]
pub async fn handle_update_draft(app: &AppState, session: &DeviceSession, payload: UpdateDraftPayload) -> Result<EventFrame> {
    app.require_not_overloaded()?;
    // `null` clears the draft; there is nothing to size-check in that case.
    if let Some(content) = &payload.encrypted_draft_md {
        if content.len() > DRAFT_MAX_CIPHERTEXT_BYTES {
            return Err(OpenMatesError::SizeLimit {
                field: "encrypted_draft_md".to_string(),
                size: content.len(),
                max: DRAFT_MAX_CIPHERTEXT_BYTES,
            });
        }
    }

    let outcome = app.version_engine.check_and_increment(
        &session.user_id,
        &payload.chat_id,
        VersionComponent::Draft,
        payload.based_on_version,
    );
    let new_version = match outcome {
        WriteOutcome::Rejected { server_version } => {
            return Err(OpenMatesError::VersionConflict {
                chat_id: payload.chat_id,
                based_on_version: payload.based_on_version,
                server_version,
            });
        }
        WriteOutcome::Accepted { new_version } => new_version,
    };

    app.cache.drafts.put(
        &session.user_id,
        &payload.chat_id,
        CachedDraft {
            encrypted_draft_md: payload.encrypted_draft_md.clone(),
            draft_v: new_version,
        },
    );
    app.persistence.enqueue_draft(
        &session.user_id,
        &payload.chat_id,
        payload.encrypted_draft_md.clone(),
        new_version,
    );
    maintain_top_n(app, &session.user_id, &payload.chat_id);

    let now = now_millis();
    let event = EventFrame::new("chat_draft_updated")
        .with_chat(payload.chat_id.clone())
        .with_data(serde_json::json!({ "encrypted_draft_md": payload.encrypted_draft_md }))
        .with_versions(VersionVectorWire {
            draft_v: Some(new_version),
            ..Default::default()
        })
        .with_timestamp(now);
    // A draft is per-(user, chat), never shared, so the only other device
    // that needs it is the user's own other devices — same exclusion rule
    // as title/message fan-out.
    app.connections
        .broadcast_except_device(&session.user_id, &session.conn_id, event.clone());
    Ok(event)
}

/// Appends are add-only: there is no `based_on_version` to gate against, so
/// every well-formed append is accepted. A new chat's row is created lazily
/// by `PersistenceWorker` the first time `messages_v` hits 1.
#[instrument(skip(app, payload), fields(chat_id = %payload.chat_id))]
pub async fn handle_append_message(app: &AppState, session: &DeviceSession, payload: AppendMessagePayload) -> Result<EventFrame> {
    app.require_not_overloaded()?;
    if payload.message.encrypted_content.len() > DRAFT_MAX_CIPHERTEXT_BYTES {
        return Err(OpenMatesError::SizeLimit {
            field: "encrypted_content".to_string(),
            size: payload.message.encrypted_content.len(),
            max: DRAFT_MAX_CIPHERTEXT_BYTES,
        });
    }

    let new_version = app
        .version_engine
        .bump(&session.user_id, &payload.chat_id, VersionComponent::Messages);

    let new_chat = if new_version == 1 && app.store.get_chat_metadata(&payload.chat_id)?.is_none() {
        let vault_key_id = app.vault.create_user_key().await?;
        Some(NewChat {
            user_id: session.user_id.clone(),
            vault_key_id,
        })
    } else {
        None
    };

    let now = now_millis();
    let row = MessageRow {
        id: payload.message.message_id.clone(),
        chat_id: payload.chat_id.clone(),
        encrypted_content: payload.message.encrypted_content.clone(),
        sender_name: payload.message.sender_name.clone(),
        created_at: openmates_core::types::now_rfc3339(),
    };
    app.persistence.enqueue_message(row, new_chat);

    if app.cache.messages.is_warm(&session.user_id, &payload.chat_id) {
        app.cache.messages.append(
            &session.user_id,
            &payload.chat_id,
            CachedMessage {
                message_id: payload.message.message_id.clone(),
                encrypted_content: payload.message.encrypted_content.clone(),
                sender_name: payload.message.sender_name.clone(),
            },
        );
    }
    maintain_top_n(app, &session.user_id, &payload.chat_id);

    let event = EventFrame::new("chat_message_appended")
        .with_chat(payload.chat_id.clone())
        .with_data(serde_json::json!({
            "message_id": payload.message.message_id,
            "encrypted_content": payload.message.encrypted_content,
            "sender_name": payload.message.sender_name,
        }))
        .with_versions(VersionVectorWire {
            messages_v: Some(new_version),
            ..Default::default()
        })
        .with_timestamp(now);
    app.connections
        .broadcast_except_device(&session.user_id, &session.conn_id, event.clone());
    Ok(event)
}

#[instrument(skip(app, payload), fields(batch_len = payload.changes.len()))]
pub async fn handle_sync_offline_changes(
    app: &AppState,
    session: &DeviceSession,
    payload: SyncOfflineChangesPayload,
) -> Result<OfflineSyncComplete> {
    app.require_not_overloaded()?;
    let summary = app
        .offline
        .replay_batch(&session.user_id, &session.conn_id, payload.changes);
    Ok(summary)
}

/// Keeps `MessageCache` consistent with `ChatIndex` ranking after any
/// version-bumping write: a chat climbing into the Top N gets warmed from
/// MetadataStore, one dropping out gets evicted ("Top-N cache
/// maintenance").
fn maintain_top_n(app: &AppState, user_id: &str, chat_id: &str) {
    let is_top_n = app.cache.is_top_n(user_id, chat_id);
    let is_warm = app.cache.messages.is_warm(user_id, chat_id);

    if is_top_n && !is_warm {
        let rows = app.store.list_messages(chat_id, 50).unwrap_or_default();
        let cached = rows
            .into_iter()
            .map(|m| CachedMessage {
                message_id: m.id,
                encrypted_content: m.encrypted_content,
                sender_name: m.sender_name,
            })
            .collect();
        app.cache.messages.warm(user_id, chat_id, cached);
    } else if !is_top_n && is_warm {
        app.cache.messages.evict(user_id, chat_id);
    }

    let top_n_chat_ids = app.cache.chat_index.top_n(user_id, app.cache.top_n);
    for stale_chat_id in app.cache.chat_index.list(user_id).into_iter().map(|e| e.chat_id) {
        if !top_n_chat_ids.contains(&stale_chat_id) && app.cache.messages.is_warm(user_id, &stale_chat_id) {
            app.cache.messages.evict(user_id, &stale_chat_id);
        }
    }
}
