use std::sync::Mutex;

use openmates_core::error::{OpenMatesError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::types::{ChatFieldUpdate, ChatRow, DraftRow, MessageRow, UserRow};

const CHAT_COLUMNS: &str = "id, user_id, encrypted_title, vault_key_id, title_v, messages_v, \
     unread_count, last_edited_overall_timestamp, created_at, updated_at";

/// Durable CRUD for users, chats, drafts, and messages. Wraps a single
/// SQLite connection in a `Mutex` — sufficient for the single-node target;
/// a connection pool would be the natural upgrade for multi-node.
pub struct MetadataStore {
    db: Mutex<Connection>,
}

impl MetadataStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    #[instrument(skip(self))]
    pub fn create_user(&self, user: &UserRow) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO users (id, email_hash, encrypted_email, encrypted_username,
                                 vault_key_id, is_admin, devices_encrypted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                user.id,
                user.email_hash,
                user.encrypted_email,
                user.encrypted_username,
                user.vault_key_id,
                user.is_admin as i64,
                user.devices_encrypted,
            ],
        )
        .map_err(OpenMatesError::database)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_user_by_email_hash(&self, email_hash: &str) -> Result<Option<UserRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, email_hash, encrypted_email, encrypted_username,
                    vault_key_id, is_admin, devices_encrypted
             FROM users WHERE email_hash = ?1",
            params![email_hash],
            row_to_user,
        )
        .optional()
        .map_err(OpenMatesError::database)
    }

    #[instrument(skip(self))]
    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, email_hash, encrypted_email, encrypted_username,
                    vault_key_id, is_admin, devices_encrypted
             FROM users WHERE id = ?1",
            params![user_id],
            row_to_user,
        )
        .optional()
        .map_err(OpenMatesError::database)
    }

    /// Read a chat's durable header without reading message/draft bodies
    /// ("without reading body fields").
    #[instrument(skip(self))]
    pub fn get_chat_metadata(&self, chat_id: &str) -> Result<Option<ChatRow>> {
        let db = self.db.lock().unwrap();
        let sql = format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1");
        db.query_row(&sql, params![chat_id], row_to_chat)
            .optional()
            .map_err(OpenMatesError::database)
    }

    #[instrument(skip(self))]
    pub fn list_user_chats(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ChatRow>> {
        let db = self.db.lock().unwrap();
        let sql = format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE user_id = ?1
             ORDER BY last_edited_overall_timestamp DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = db.prepare(&sql).map_err(OpenMatesError::database)?;
        let rows = stmt
            .query_map(params![user_id, limit, offset], row_to_chat)
            .map_err(OpenMatesError::database)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(OpenMatesError::database)
    }

    /// Create the chat row. Invariant: called only once the first message
    /// has been persisted ; before that the chat lives only in the
    /// client's state.
    #[instrument(skip(self))]
    pub fn create_chat(&self, chat: &ChatRow) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO chats
                (id, user_id, encrypted_title, vault_key_id, title_v, messages_v,
                 unread_count, last_edited_overall_timestamp, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                chat.id,
                chat.user_id,
                chat.encrypted_title,
                chat.vault_key_id,
                chat.title_v as i64,
                chat.messages_v as i64,
                chat.unread_count,
                chat.last_edited_overall_timestamp,
                chat.created_at,
                chat.updated_at,
            ],
        )
        .map_err(OpenMatesError::database)?;
        Ok(())
    }

    /// Blind write — the caller (VersionEngine/PersistenceWorker) has
    /// already version-guarded the change.
    #[instrument(skip(self, fields))]
    pub fn update_chat_fields(&self, chat_id: &str, fields: &ChatFieldUpdate) -> Result<()> {
        let mut sets = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref v) = fields.encrypted_title {
            sets.push("encrypted_title = ?");
            values.push(Box::new(v.clone()));
        }
        if let Some(v) = fields.title_v {
            sets.push("title_v = ?");
            values.push(Box::new(v as i64));
        }
        if let Some(v) = fields.messages_v {
            sets.push("messages_v = ?");
            values.push(Box::new(v as i64));
        }
        if let Some(v) = fields.unread_count {
            sets.push("unread_count = ?");
            values.push(Box::new(v));
        }
        if let Some(v) = fields.last_edited_overall_timestamp {
            sets.push("last_edited_overall_timestamp = ?");
            values.push(Box::new(v));
        }

        if sets.is_empty() {
            return Ok(());
        }

        sets.push("updated_at = ?");
        values.push(Box::new(openmates_core::types::now_rfc3339()));
        values.push(Box::new(chat_id.to_string()));

        let sql = format!("UPDATE chats SET {} WHERE id = ?", sets.join(", "));
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|b| b.as_ref()).collect();

        let db = self.db.lock().unwrap();
        let rows_changed = db
            .execute(&sql, param_refs.as_slice())
            .map_err(OpenMatesError::database)?;
        if rows_changed == 0 {
            return Err(OpenMatesError::NotFound {
                what: format!("chat {chat_id}"),
            });
        }
        Ok(())
    }

    /// Idempotent on `message_id`.
    #[instrument(skip(self, message))]
    pub fn append_message(&self, message: &MessageRow) -> Result<MessageRow> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO messages (id, chat_id, encrypted_content, sender_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id,
                message.chat_id,
                message.encrypted_content,
                message.sender_name,
                message.created_at,
            ],
        )
        .map_err(OpenMatesError::database)?;

        db.query_row(
            "SELECT id, chat_id, encrypted_content, sender_name, created_at
             FROM messages WHERE id = ?1",
            params![message.id],
            row_to_message,
        )
        .map_err(OpenMatesError::database)
    }

    #[instrument(skip(self))]
    pub fn list_messages(&self, chat_id: &str, limit: i64) -> Result<Vec<MessageRow>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db
            .prepare(
                "SELECT id, chat_id, encrypted_content, sender_name, created_at
                 FROM messages WHERE chat_id = ?1 ORDER BY created_at DESC LIMIT ?2",
            )
            .map_err(OpenMatesError::database)?;
        let rows = stmt
            .query_map(params![chat_id, limit], row_to_message)
            .map_err(OpenMatesError::database)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(OpenMatesError::database)
    }

    /// Upsert a draft. Idempotent: a write whose `version` does not exceed
    /// the stored version is a no-op (idempotency rule), applied
    /// here via the `WHERE excluded.version > drafts.version` guard.
    #[instrument(skip(self, encrypted_content))]
    pub fn upsert_draft(
        &self,
        hashed_user_id: &str,
        chat_id: &str,
        encrypted_content: &str,
        version: u64,
    ) -> Result<DraftRow> {
        let db = self.db.lock().unwrap();
        let now = openmates_core::types::now_rfc3339();
        let id = format!("{chat_id}:{hashed_user_id}");
        db.execute(
            "INSERT INTO drafts (id, chat_id, hashed_user_id, encrypted_content, version, last_edited_timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(chat_id, hashed_user_id) DO UPDATE SET
                encrypted_content = excluded.encrypted_content,
                version = excluded.version,
                last_edited_timestamp = excluded.last_edited_timestamp
             WHERE excluded.version > drafts.version",
            params![id, chat_id, hashed_user_id, encrypted_content, version as i64, now],
        )
        .map_err(OpenMatesError::database)?;

        db.query_row(
            "SELECT id, chat_id, hashed_user_id, encrypted_content, version, last_edited_timestamp
             FROM drafts WHERE chat_id = ?1 AND hashed_user_id = ?2",
            params![chat_id, hashed_user_id],
            row_to_draft,
        )
        .map_err(OpenMatesError::database)
    }

    #[instrument(skip(self))]
    pub fn get_draft(&self, hashed_user_id: &str, chat_id: &str) -> Result<Option<DraftRow>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, chat_id, hashed_user_id, encrypted_content, version, last_edited_timestamp
             FROM drafts WHERE chat_id = ?1 AND hashed_user_id = ?2",
            params![chat_id, hashed_user_id],
            row_to_draft,
        )
        .optional()
        .map_err(OpenMatesError::database)
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        encrypted_title: row.get(2)?,
        vault_key_id: row.get(3)?,
        title_v: row.get::<_, i64>(4)? as u64,
        messages_v: row.get::<_, i64>(5)? as u64,
        unread_count: row.get(6)?,
        last_edited_overall_timestamp: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        encrypted_content: row.get(2)?,
        sender_name: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_draft(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftRow> {
    Ok(DraftRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        hashed_user_id: row.get(2)?,
        encrypted_content: row.get(3)?,
        version: row.get::<_, i64>(4)? as u64,
        last_edited_timestamp: row.get(5)?,
    })
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email_hash: row.get(1)?,
        encrypted_email: row.get(2)?,
        encrypted_username: row.get(3)?,
        vault_key_id: row.get(4)?,
        is_admin: row.get::<_, i64>(5)? != 0,
        devices_encrypted: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn test_store() -> MetadataStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        MetadataStore::new(conn)
    }

    fn sample_chat(id: &str, user_id: &str) -> ChatRow {
        ChatRow {
            id: id.to_string(),
            user_id: user_id.to_string(),
            encrypted_title: "CT_A".to_string(),
            vault_key_id: "vk1".to_string(),
            title_v: 3,
            messages_v: 0,
            unread_count: 0,
            last_edited_overall_timestamp: 1000,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn create_then_get_chat_metadata() {
        let store = test_store();
        store.create_chat(&sample_chat("c1", "u1")).unwrap();

        let row = store.get_chat_metadata("c1").unwrap().unwrap();
        assert_eq!(row.title_v, 3);
        assert_eq!(row.user_id, "u1");
    }

    #[test]
    fn update_chat_fields_is_blind_write() {
        let store = test_store();
        store.create_chat(&sample_chat("c1", "u1")).unwrap();

        store
            .update_chat_fields(
                "c1",
                &ChatFieldUpdate {
                    title_v: Some(4),
                    encrypted_title: Some("CT_B".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let row = store.get_chat_metadata("c1").unwrap().unwrap();
        assert_eq!(row.title_v, 4);
        assert_eq!(row.encrypted_title, "CT_B");
    }

    #[test]
    fn append_message_is_idempotent() {
        let store = test_store();
        store.create_chat(&sample_chat("c1", "u1")).unwrap();

        let msg = MessageRow {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            encrypted_content: "CT_M".to_string(),
            sender_name: "alice".to_string(),
            created_at: "2026-01-01T00:00:01Z".to_string(),
        };
        store.append_message(&msg).unwrap();
        store.append_message(&msg).unwrap();

        let messages = store.list_messages("c1", 10).unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn upsert_draft_rejects_stale_version() {
        let store = test_store();
        store.create_chat(&sample_chat("c1", "u1")).unwrap();

        store.upsert_draft("hashed-u1", "c1", "CT_D1", 3).unwrap();
        let row = store.upsert_draft("hashed-u1", "c1", "CT_D_stale", 2).unwrap();

        // version 2 <= stored version 3: the conflicting write is ignored
        assert_eq!(row.version, 3);
        assert_eq!(row.encrypted_content, "CT_D1");
    }

    #[test]
    fn upsert_draft_accepts_newer_version() {
        let store = test_store();
        store.create_chat(&sample_chat("c1", "u1")).unwrap();

        store.upsert_draft("hashed-u1", "c1", "CT_D1", 3).unwrap();
        let row = store.upsert_draft("hashed-u1", "c1", "CT_D2", 4).unwrap();

        assert_eq!(row.version, 4);
        assert_eq!(row.encrypted_content, "CT_D2");
    }

    #[test]
    fn list_user_chats_orders_by_recency() {
        let store = test_store();
        let mut a = sample_chat("c1", "u1");
        a.last_edited_overall_timestamp = 100;
        let mut b = sample_chat("c2", "u1");
        b.last_edited_overall_timestamp = 200;
        store.create_chat(&a).unwrap();
        store.create_chat(&b).unwrap();

        let chats = store.list_user_chats("u1", 10, 0).unwrap();
        assert_eq!(chats[0].id, "c2");
        assert_eq!(chats[1].id, "c1");
    }
}
