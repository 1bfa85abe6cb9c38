use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use hex::encode as hex_encode;
use openmates_core::config::PersistenceConfig;
use openmates_metadatastore::types::ChatFieldUpdate;
use openmates_metadatastore::MetadataStore;
use openmates_offline::PersistenceQueue;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, instrument, warn};

use crate::task::{NewChat, PersistenceTask};

/// A reconnecting device needs to find its own draft again under a stable
/// key without the store ever seeing the raw `user_id` twice. `user_id` is
/// already a non-guessable `Uuid::now_v7()` , so an unkeyed digest
/// is enough; there is no secret to protect with an HMAC here.
pub fn hash_user_id(user_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hex_encode(hasher.finalize())
}

/// Coalescing window for queued draft writes: only the latest write per
/// (user, chat) pair since the last flush is ever persisted.
const DRAFT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

type DraftKey = (String, String);

/// Cloneable write-side handle passed to `OfflineReplayer`/the sync
/// gateway. Title and message writes go straight onto an mpsc queue;
/// draft writes coalesce in a map keyed by (user_id, chat_id) so a
/// fast-typing user never floods the store with intermediate versions.
#[derive(Clone)]
pub struct PersistenceHandle {
    immediate_tx: mpsc::Sender<PersistenceTask>,
    draft_coalesce: Arc<DashMap<DraftKey, PersistenceTask>>,
    dead_letter: Arc<Mutex<Vec<PersistenceTask>>>,
}

impl PersistenceHandle {
    /// `new_chat` is `Some` only for the first message ever sent in a chat;
    /// the worker creates the chat row before inserting the message.
    pub fn enqueue_message(
        &self,
        message: openmates_metadatastore::types::MessageRow,
        new_chat: Option<NewChat>,
    ) {
        let chat_id = message.chat_id.clone();
        if self
            .immediate_tx
            .try_send(PersistenceTask::Message { message, new_chat })
            .is_err()
        {
            warn!(chat_id, "persistence queue full or closed; message write dropped");
        }
    }

    /// True once the immediate queue is past its configured high-water
    /// mark; callers reject new writes with `Overloaded` while this
    /// holds rather than let the channel back up further.
    pub fn is_overloaded(&self) -> bool {
        self.immediate_tx.capacity() == 0
    }

    /// Number of tasks that exhausted `max_retries` and were parked rather
    /// than applied. Non-empty means durable state has drifted behind
    /// HotCache and needs operator attention.
    pub fn dead_letter_len(&self) -> usize {
        self.dead_letter.lock().unwrap().len()
    }
}

impl PersistenceQueue for PersistenceHandle {
    fn enqueue_title(&self, chat_id: &str, encrypted_title: String, title_v: u64) {
        let task = PersistenceTask::Title {
            chat_id: chat_id.to_string(),
            encrypted_title,
            title_v,
        };
        if self.immediate_tx.try_send(task).is_err() {
            warn!(chat_id, "persistence queue full or closed; title write dropped");
        }
    }

    fn enqueue_draft(&self, user_id: &str, chat_id: &str, encrypted_draft_md: Option<String>, draft_v: u64) {
        self.draft_coalesce.insert(
            (user_id.to_string(), chat_id.to_string()),
            PersistenceTask::Draft {
                user_id: user_id.to_string(),
                chat_id: chat_id.to_string(),
                encrypted_draft_md,
                draft_v,
            },
        );
    }
}

/// Background consumer draining the immediate queue and the draft
/// coalescing map into `MetadataStore`, retrying transient failures with
/// exponential backoff before parking a task in the dead-letter list.
/// Structured the same way `ReminderEngine` is: a handle that writers
/// talk to, and a worker that owns the receiving half and runs its own
/// tick loop until told to shut down.
pub struct PersistenceWorker {
    store: Arc<MetadataStore>,
    immediate_rx: mpsc::Receiver<PersistenceTask>,
    draft_coalesce: Arc<DashMap<DraftKey, PersistenceTask>>,
    dead_letter: Arc<Mutex<Vec<PersistenceTask>>>,
    max_retries: u32,
    retry_base: Duration,
}

/// Build a connected handle/worker pair. `queue_high_water_mark` bounds the
/// immediate queue; once full, new title/message writes are dropped rather
/// than blocking the caller (backpressure policy).
pub fn channel(store: Arc<MetadataStore>, config: &PersistenceConfig) -> (PersistenceHandle, PersistenceWorker) {
    let (tx, rx) = mpsc::channel(config.queue_high_water_mark);
    let draft_coalesce = Arc::new(DashMap::new());
    let dead_letter = Arc::new(Mutex::new(Vec::new()));

    let handle = PersistenceHandle {
        immediate_tx: tx,
        draft_coalesce: draft_coalesce.clone(),
        dead_letter: dead_letter.clone(),
    };
    let worker = PersistenceWorker {
        store,
        immediate_rx: rx,
        draft_coalesce,
        dead_letter,
        max_retries: config.max_retries,
        retry_base: Duration::from_millis(config.retry_base_ms),
    };
    (handle, worker)
}

impl PersistenceWorker {
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("persistence worker started");
        let mut draft_flush = tokio::time::interval(DRAFT_FLUSH_INTERVAL);

        loop {
            tokio::select! {
                task = self.immediate_rx.recv() => {
                    match task {
                        Some(task) => self.execute_with_retry(task).await,
                        None => break,
                    }
                }
                _ = draft_flush.tick() => {
                    self.flush_drafts().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("persistence worker shutting down; flushing queued drafts");
                        self.flush_drafts().await;
                        break;
                    }
                }
            }
        }
    }

    async fn flush_drafts(&self) {
        let keys: Vec<DraftKey> = self.draft_coalesce.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, task)) = self.draft_coalesce.remove(&key) {
                self.execute_with_retry(task).await;
            }
        }
    }

    #[instrument(skip(self, task), fields(kind = task.kind()))]
    async fn execute_with_retry(&self, task: PersistenceTask) {
        let max_attempts = self.max_retries + 1;
        for attempt in 0..max_attempts {
            match self.execute_once(&task) {
                Ok(()) => return,
                Err(e) if attempt + 1 < max_attempts => {
                    let delay = self.retry_base * 2u32.saturating_pow(attempt);
                    warn!(error = %e, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "persistence write failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(error = %e, "persistence task exhausted retries; parking in dead-letter list");
                    self.dead_letter.lock().unwrap().push(task);
                    return;
                }
            }
        }
    }

    fn execute_once(&self, task: &PersistenceTask) -> openmates_core::error::Result<()> {
        match task {
            PersistenceTask::Title {
                chat_id,
                encrypted_title,
                title_v,
            } => self.store.update_chat_fields(
                chat_id,
                &ChatFieldUpdate {
                    encrypted_title: Some(encrypted_title.clone()),
                    title_v: Some(*title_v),
                    ..Default::default()
                },
            ),
            PersistenceTask::Draft {
                user_id,
                chat_id,
                encrypted_draft_md,
                draft_v,
            } => {
                let hashed = hash_user_id(user_id);
                // The drafts table has no NULL column for a cleared draft;
                // empty content is the durable representation of "cleared".
                let content = encrypted_draft_md.as_deref().unwrap_or("");
                self.store.upsert_draft(&hashed, chat_id, content, *draft_v).map(|_| ())
            }
            PersistenceTask::Message { message, new_chat } => {
                if let Some(new_chat) = new_chat {
                    if self.store.get_chat_metadata(&message.chat_id)?.is_none() {
                        self.store.create_chat(&openmates_metadatastore::types::ChatRow {
                            id: message.chat_id.clone(),
                            user_id: new_chat.user_id.clone(),
                            encrypted_title: String::new(),
                            vault_key_id: new_chat.vault_key_id.clone(),
                            title_v: 0,
                            messages_v: 0,
                            unread_count: 0,
                            last_edited_overall_timestamp: 0,
                            created_at: message.created_at.clone(),
                            updated_at: message.created_at.clone(),
                        })?;
                    }
                }
                self.store.append_message(message).map(|_| ())
            }
        }
    }
}
