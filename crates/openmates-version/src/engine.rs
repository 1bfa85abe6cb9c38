use openmates_core::types::{now_millis, VersionComponent, VersionVector};
use openmates_hotcache::HotCache;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of applying the conflict rule to one component write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `version_before_edit >= server_v`: the write was applied and the
    /// component incremented to `new_version`.
    Accepted { new_version: u64 },
    /// `version_before_edit < server_v`: the write is stale and was not
    /// applied. `server_version` is what the caller should resync against.
    Rejected { server_version: u64 },
}

/// Issues and advances per-chat version components, arbitrating writes via
/// the `based_on_version` >= current conflict rule. Holds no state of its
/// own — `HotCache` is the single writable authority for versions and
/// scores; this is a thin façade that adds the conflict rule and an
/// accept/reject outcome convention on top of the raw cache primitives.
pub struct VersionEngine {
    cache: Arc<HotCache>,
}

impl VersionEngine {
    pub fn new(cache: Arc<HotCache>) -> Self {
        Self { cache }
    }

    #[instrument(skip(self))]
    pub fn read_versions(&self, user_id: &str, chat_id: &str) -> VersionVector {
        let _ = user_id;
        self.cache.versions.read(chat_id, now_millis())
    }

    /// Applies the conflict rule for one component write and, on
    /// acceptance, increments the component and bumps the user's chat
    /// index score in the same call — callers never increment directly.
    #[instrument(skip(self), fields(chat_id, user_id, component = %component))]
    pub fn check_and_increment(
        &self,
        user_id: &str,
        chat_id: &str,
        component: VersionComponent,
        version_before_edit: u64,
    ) -> WriteOutcome {
        let server_v = self.cache.versions.current_component(chat_id, component);
        if version_before_edit < server_v {
            warn!(server_v, version_before_edit, "rejecting stale write");
            return WriteOutcome::Rejected {
                server_version: server_v,
            };
        }

        let now = now_millis();
        let new_version = self.cache.versions.increment(chat_id, component, now);
        self.cache.chat_index.update_score(user_id, chat_id, now);
        info!(new_version, "accepted write");
        WriteOutcome::Accepted { new_version }
    }

    pub fn update_score(&self, user_id: &str, chat_id: &str, ts: i64) {
        self.cache.chat_index.update_score(user_id, chat_id, ts);
    }

    /// Unconditional increment for components with no conflict rule —
    /// currently only message appends, which are add-only and carry no
    /// `based_on_version` to gate against (: every `append_message`
    /// is accepted).
    #[instrument(skip(self))]
    pub fn bump(&self, user_id: &str, chat_id: &str, component: openmates_core::types::VersionComponent) -> u64 {
        let now = now_millis();
        let new_version = self.cache.versions.increment(chat_id, component, now);
        self.cache.chat_index.update_score(user_id, chat_id, now);
        new_version
    }
}
