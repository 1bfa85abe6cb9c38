use openmates_protocol::frames::EventFrame;

/// Fan-out seam for accepted offline changes: every other device of the
/// user, *including the sender's other devices*, gets the event — only the
/// originating connection is excluded. A direct dependency on the
/// connection-handling crate isn't possible since that crate in turn
/// depends on this one to run replay.
pub trait Broadcaster: Send + Sync {
    fn broadcast_except_device(&self, user_id: &str, exclude_device: &str, event: EventFrame);
}

/// Hand-off to `PersistenceWorker` once a change is accepted and written to
/// HotCache. Kept as a trait for the same reason as `Broadcaster` — no
/// dependency on a crate built later.
pub trait PersistenceQueue: Send + Sync {
    fn enqueue_title(&self, chat_id: &str, encrypted_title: String, title_v: u64);
    fn enqueue_draft(&self, user_id: &str, chat_id: &str, encrypted_draft_md: Option<String>, draft_v: u64);
}
