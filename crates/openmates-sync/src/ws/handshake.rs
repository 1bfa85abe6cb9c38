//! Connect-time identity resolution and the warm `ConnectedAck` snapshot.
//!
//! `ConnectPayload` carries only `{token, device_fingerprint_hash}` — there
//! is no separate login façade in this crate, so `token` is treated as the
//! user's plaintext email address and handed straight to `UserResolver`.
//! See DESIGN.md's Open Questions for why.

use openmates_core::error::{OpenMatesError, Result};
use openmates_core::types::{now_millis, ConnId, VersionVector};
use openmates_metadatastore::types::ChatRow;
use openmates_protocol::handshake::{ChatSnapshot, ConnectPayload, ConnectedAck};
use openmates_protocol::PROTOCOL_VERSION;
use openmates_users::NewAccountEnvelope;
use tracing::instrument;

use crate::app::AppState;

/// Resolved identity for one WS connection, threaded through every
/// subsequent action handler.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub user_id: String,
    pub conn_id: String,
    pub device_fingerprint_hash: String,
}

/// Runs the connect flow: validates the bearer token, resolves (or
/// provisions) the user, and assembles the warm chat snapshot sent back in
/// `ConnectedAck` (connect sequence).
#[instrument(skip(app, payload), fields(device_fingerprint_hash = %payload.device_fingerprint_hash))]
pub async fn authenticate(app: &AppState, payload: &ConnectPayload) -> Result<(DeviceSession, ConnectedAck)> {
    use openmates_core::config::AuthMode;

    if payload.token.trim().is_empty() {
        return Err(OpenMatesError::NotAuthenticated);
    }
    if app.config.gateway.auth.mode == AuthMode::Token && app.config.gateway.auth.token.is_none() {
        return Err(OpenMatesError::Config("token auth enabled but no server token configured".into()));
    }

    // `on_new` below is synchronous, so any KeyVault work the new-account
    // path needs has to happen here, eagerly, and is thrown away if the
    // email turns out to already be known (NewAccountEnvelope's own
    // contract — see openmates-users::resolver).
    let vault_key_id = app.vault.create_user_key().await?;
    let (email_envelope, _v) = app.vault.encrypt(payload.token.as_bytes(), &vault_key_id, None).await?;
    let username_guess = payload.token.split('@').next().unwrap_or("user");
    let (username_envelope, _v2) = app.vault.encrypt(username_guess.as_bytes(), &vault_key_id, None).await?;
    let encrypted_email = serde_json::to_string(&email_envelope)?;
    let encrypted_username = serde_json::to_string(&username_envelope)?;

    let resolved = app
        .users
        .resolve(&payload.token, || NewAccountEnvelope {
            vault_key_id,
            encrypted_email,
            encrypted_username,
        })
        .await?;
    let user_id = resolved.row().id.clone();

    let session = DeviceSession {
        user_id: user_id.clone(),
        conn_id: ConnId::new().to_string(),
        device_fingerprint_hash: payload.device_fingerprint_hash.clone(),
    };

    let chat_rows = app.store.list_user_chats(&user_id, 1000, 0)?;
    let chats = chat_rows
        .into_iter()
        .map(|row| snapshot_for_chat(app, &user_id, &row))
        .collect();

    let ack = ConnectedAck {
        protocol: PROTOCOL_VERSION,
        user_id,
        chats,
    };

    Ok((session, ack))
}

/// HotCache is only authoritative for a chat once something in this
/// process run has touched it; on cold start, seed it from the durable row
/// before reading back the version vector ("read-through").
fn snapshot_for_chat(app: &AppState, user_id: &str, row: &ChatRow) -> ChatSnapshot {
    if app.cache.chat_index.rank_of(user_id, &row.id).is_none() {
        let hashed = openmates_persistence::hash_user_id(user_id);
        let draft_v = app
            .store
            .get_draft(&hashed, &row.id)
            .ok()
            .flatten()
            .map(|d| d.version)
            .unwrap_or(0);
        app.cache.versions.seed(
            &row.id,
            VersionVector {
                title_v: row.title_v,
                draft_v,
                messages_v: row.messages_v,
                last_edited_overall_timestamp: row.last_edited_overall_timestamp,
            },
        );
        app.cache
            .chat_index
            .update_score(user_id, &row.id, row.last_edited_overall_timestamp);
    }

    let v = app.version_engine.read_versions(user_id, &row.id);
    ChatSnapshot {
        chat_id: row.id.clone(),
        title_v: v.title_v,
        draft_v: v.draft_v,
        messages_v: v.messages_v,
        last_edited_overall_timestamp: v.last_edited_overall_timestamp,
    }
}
