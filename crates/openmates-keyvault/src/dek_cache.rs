use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

/// Cached plaintext DEK, keyed by `(key_id, context)`. Bounded to a short TTL
/// ("cache token validity for ≤30s") so the KV's unwrap path is
/// taken again periodically rather than trusting a stale key forever.
struct CachedDek {
    dek: [u8; 32],
    cached_at: Instant,
}

impl CachedDek {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

pub struct DekCache {
    entries: Arc<RwLock<HashMap<String, CachedDek>>>,
    ttl: Duration,
}

impl DekCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    fn cache_key(key_id: &str, context: Option<&str>) -> String {
        format!("{key_id}:{}", context.unwrap_or(""))
    }

    pub async fn get(&self, key_id: &str, context: Option<&str>) -> Option<[u8; 32]> {
        let cache = self.entries.read().await;
        let entry = cache.get(&Self::cache_key(key_id, context))?;
        if entry.is_expired(self.ttl) {
            return None;
        }
        Some(entry.dek)
    }

    pub async fn put(&self, key_id: &str, context: Option<&str>, dek: [u8; 32]) {
        let mut cache = self.entries.write().await;
        cache.insert(
            Self::cache_key(key_id, context),
            CachedDek {
                dek,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop all expired entries. Called opportunistically rather than on a
    /// timer — the cache is small and reads already check expiry.
    pub async fn sweep(&self) {
        let mut cache = self.entries.write().await;
        cache.retain(|_, v| !v.is_expired(self.ttl));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expires_after_ttl() {
        let cache = DekCache::new(Duration::from_millis(20));
        cache.put("k1", Some("ctx"), [7u8; 32]).await;
        assert_eq!(cache.get("k1", Some("ctx")).await, Some([7u8; 32]));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k1", Some("ctx")).await, None);
    }

    #[tokio::test]
    async fn distinguishes_context() {
        let cache = DekCache::new(Duration::from_secs(30));
        cache.put("k1", Some("user-a"), [1u8; 32]).await;
        assert_eq!(cache.get("k1", Some("user-b")).await, None);
        assert_eq!(cache.get("k1", Some("user-a")).await, Some([1u8; 32]));
    }
}
