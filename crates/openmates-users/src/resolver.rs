use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use openmates_core::error::Result;
use openmates_core::types::UserId;
use openmates_keyvault::KeyVault;
use openmates_metadatastore::{types::UserRow, MetadataStore};
use tracing::{debug, info, instrument};

/// Maximum number of `email_hash -> user_id` pairs kept in the in-process
/// cache. Simple eviction: when full, drop the oldest half.
const CACHE_MAX: usize = 256;

/// Result of resolving an email to a user.
#[derive(Debug)]
pub enum ResolvedUser {
    Known(UserRow),
    /// Auto-created on first contact — account provisioning happens on
    /// first authenticated connect, not a separate signup step.
    NewlyCreated(UserRow),
}

impl ResolvedUser {
    pub fn row(&self) -> &UserRow {
        match self {
            ResolvedUser::Known(u) => u,
            ResolvedUser::NewlyCreated(u) => u,
        }
    }
}

/// Everything needed to provision a brand-new user row, prepared by the
/// caller *before* calling `resolve` — the caller already holds a KeyVault
/// handle for the connect flow, so it creates the key and encrypts the
/// email/username eagerly. If the email turns out to already be known,
/// this is simply discarded; optimistic creation keeps `resolve` free of
/// its own KeyVault round-trips beyond the HMAC lookup.
pub struct NewAccountEnvelope {
    pub vault_key_id: String,
    pub encrypted_email: String,
    pub encrypted_username: String,
}

/// Translates a plaintext email into a first-class OpenMates user,
/// auto-provisioning one on first contact.
///
/// Hot path: every connect calls `resolve`. The `email_hash -> user_id`
/// mapping is cached in-process so repeat connects from the same user skip
/// the MetadataStore round-trip (the HMAC call to KeyVault still happens
/// every time — it's what proves the caller actually knows the email, not
/// just a cached digest).
pub struct UserResolver {
    store: Arc<MetadataStore>,
    vault: Arc<dyn KeyVault>,
    email_hmac_key_id: String,
    /// Key: email_hash, Value: user_id.
    cache: Mutex<HashMap<String, String>>,
    /// Insertion-order key list for eviction — parallel to the HashMap.
    cache_order: Mutex<Vec<String>>,
}

impl UserResolver {
    pub fn new(store: Arc<MetadataStore>, vault: Arc<dyn KeyVault>, email_hmac_key_id: String) -> Self {
        Self {
            store,
            vault,
            email_hmac_key_id,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a plaintext email to a user. `on_new` is consulted only if
    /// no existing user matches; it is never invoked on a cache or store
    /// hit, so callers may prepare it lazily.
    #[instrument(skip(self, email, on_new))]
    pub async fn resolve(
        &self,
        email: &str,
        on_new: impl FnOnce() -> NewAccountEnvelope,
    ) -> Result<ResolvedUser> {
        let email_hash = self.vault.hmac(email.as_bytes(), &self.email_hmac_key_id).await?;

        if let Some(user_id) = self.cache_lookup(&email_hash) {
            debug!(user_id, "user cache hit");
            if let Some(user) = self.store.get_user(&user_id)? {
                return Ok(ResolvedUser::Known(user));
            }
            // Row vanished under us; fall through to a fresh lookup.
            self.cache_remove(&email_hash);
        }

        if let Some(user) = self.store.get_user_by_email_hash(&email_hash)? {
            self.cache_insert(email_hash, user.id.clone());
            return Ok(ResolvedUser::Known(user));
        }

        info!("new email; provisioning user");
        let envelope = on_new();
        let user = UserRow {
            id: UserId::new().to_string(),
            email_hash: email_hash.clone(),
            encrypted_email: envelope.encrypted_email,
            encrypted_username: envelope.encrypted_username,
            vault_key_id: envelope.vault_key_id,
            is_admin: false,
            devices_encrypted: "[]".to_string(),
        };
        self.store.create_user(&user)?;
        self.cache_insert(email_hash, user.id.clone());

        Ok(ResolvedUser::NewlyCreated(user))
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>> {
        self.store.get_user(user_id)
    }

    /// Drop the cache entry for `email_hash`. Call after any external
    /// mutation of the user row that bypassed this resolver.
    pub fn invalidate(&self, email_hash: &str) {
        self.cache_remove(email_hash);
    }

    // ── cache helpers ────────────────────────────────────────────────

    fn cache_lookup(&self, key: &str) -> Option<String> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn cache_remove(&self, key: &str) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        cache.remove(key);
        order.retain(|k| k != key);
    }

    fn cache_insert(&self, key: String, user_id: String) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if let std::collections::hash_map::Entry::Occupied(mut e) = cache.entry(key.clone()) {
            e.insert(user_id);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(key.clone());
        cache.insert(key, user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openmates_keyvault::InProcessKeyVault;
    use openmates_metadatastore::db::init_db;
    use rusqlite::Connection;
    use std::time::Duration;

    const HMAC_KEY_ID: &str = "email-hmac-key";

    async fn resolver() -> UserResolver {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = Arc::new(MetadataStore::new(conn));
        let vault = InProcessKeyVault::new(Duration::from_secs(30));
        vault.ensure_hmac_key(HMAC_KEY_ID).await;
        UserResolver::new(store, Arc::new(vault), HMAC_KEY_ID.to_string())
    }

    fn envelope() -> NewAccountEnvelope {
        NewAccountEnvelope {
            vault_key_id: "key-1".to_string(),
            encrypted_email: "ct-email".to_string(),
            encrypted_username: "ct-username".to_string(),
        }
    }

    #[tokio::test]
    async fn unknown_email_is_auto_provisioned() {
        let resolver = resolver().await;
        let resolved = resolver.resolve("alice@example.com", envelope).await.unwrap();
        assert!(matches!(resolved, ResolvedUser::NewlyCreated(_)));
        assert_eq!(resolved.row().encrypted_email, "ct-email");
    }

    #[tokio::test]
    async fn known_email_resolves_without_invoking_on_new() {
        let resolver = resolver().await;
        let first = resolver.resolve("alice@example.com", envelope).await.unwrap();
        let first_id = first.row().id.clone();

        let second = resolver
            .resolve("alice@example.com", || panic!("on_new must not run for a known email"))
            .await
            .unwrap();
        assert!(matches!(second, ResolvedUser::Known(_)));
        assert_eq!(second.row().id, first_id);
    }

    #[tokio::test]
    async fn different_emails_resolve_to_different_users() {
        let resolver = resolver().await;
        let a = resolver.resolve("alice@example.com", envelope).await.unwrap();
        let b = resolver.resolve("bob@example.com", envelope).await.unwrap();
        assert_ne!(a.row().id, b.row().id);
    }

    #[tokio::test]
    async fn cache_hit_survives_store_restart_lookup_by_id() {
        let resolver = resolver().await;
        let created = resolver.resolve("alice@example.com", envelope).await.unwrap();
        let again = resolver.resolve("alice@example.com", envelope).await.unwrap();
        assert_eq!(created.row().id, again.row().id);
    }
}
