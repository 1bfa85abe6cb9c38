use openmates_metadatastore::types::MessageRow;

/// A chat row does not exist until its first message is persisted. When a
/// `Message` task is the first one ever queued for a chat, it carries the
/// freshly minted KEK id so the worker can create the row before inserting
/// the message.
#[derive(Debug, Clone)]
pub struct NewChat {
    pub user_id: String,
    pub vault_key_id: String,
}

/// One unit of asynchronous, at-least-once work queued from HotCache to
/// MetadataStore. Each variant carries everything `MetadataStore` needs
/// to apply it idempotently.
#[derive(Debug, Clone)]
pub enum PersistenceTask {
    Title {
        chat_id: String,
        encrypted_title: String,
        title_v: u64,
    },
    Draft {
        user_id: String,
        chat_id: String,
        encrypted_draft_md: Option<String>,
        draft_v: u64,
    },
    Message {
        message: MessageRow,
        new_chat: Option<NewChat>,
    },
}

impl PersistenceTask {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceTask::Title { .. } => "title",
            PersistenceTask::Draft { .. } => "draft",
            PersistenceTask::Message { .. } => "message",
        }
    }
}
