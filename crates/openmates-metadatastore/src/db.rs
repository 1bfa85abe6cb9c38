use rusqlite::{Connection, Result};

/// Initialise all tables for the metadata store. Safe to call on every
/// startup — `CREATE TABLE IF NOT EXISTS` makes it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_users_table(conn)?;
    create_chats_table(conn)?;
    create_messages_table(conn)?;
    create_drafts_table(conn)?;
    Ok(())
}

fn create_users_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                  TEXT PRIMARY KEY NOT NULL,
            email_hash          TEXT NOT NULL UNIQUE,
            encrypted_email     TEXT NOT NULL,
            encrypted_username  TEXT NOT NULL,
            vault_key_id        TEXT NOT NULL,
            is_admin            INTEGER NOT NULL DEFAULT 0,
            devices_encrypted   TEXT NOT NULL DEFAULT ''
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_users_email_hash ON users (email_hash);",
    )
}

fn create_chats_table(conn: &Connection) -> Result<()> {
    // idx_chats_user_rank backs list_user_chats' ORDER BY last_edited_overall_timestamp DESC.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chats (
            id                              TEXT PRIMARY KEY NOT NULL,
            user_id                         TEXT NOT NULL REFERENCES users(id),
            encrypted_title                 TEXT NOT NULL,
            vault_key_id                    TEXT NOT NULL,
            title_v                         INTEGER NOT NULL DEFAULT 0,
            messages_v                      INTEGER NOT NULL DEFAULT 0,
            unread_count                    INTEGER NOT NULL DEFAULT 0,
            last_edited_overall_timestamp   INTEGER NOT NULL,
            created_at                      TEXT NOT NULL,
            updated_at                      TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_chats_user_rank
            ON chats (user_id, last_edited_overall_timestamp DESC);",
    )
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY NOT NULL,
            chat_id             TEXT NOT NULL REFERENCES chats(id),
            encrypted_content   TEXT NOT NULL,
            sender_name         TEXT NOT NULL,
            created_at          TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_messages_chat_order
            ON messages (chat_id, created_at);",
    )
}

fn create_drafts_table(conn: &Connection) -> Result<()> {
    // UNIQUE(chat_id, hashed_user_id) makes upsert_draft a single-row target.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS drafts (
            id                      TEXT PRIMARY KEY NOT NULL,
            chat_id                 TEXT NOT NULL REFERENCES chats(id),
            hashed_user_id          TEXT NOT NULL,
            encrypted_content       TEXT NOT NULL,
            version                 INTEGER NOT NULL DEFAULT 0,
            last_edited_timestamp   TEXT NOT NULL,
            UNIQUE(chat_id, hashed_user_id)
        ) STRICT;",
    )
}
