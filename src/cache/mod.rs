//! TTL result cache with a best-effort durable mirror.
//!
//! The in-memory map is authoritative. Every write is mirrored to the
//! durable store so a restart can rehydrate warm entries; mirror failures
//! are logged, never raised. Expiry is checked lazily on read, and an
//! expired entry's mirror document is deleted from a spawned task.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::models::CampaignResult;
use crate::storage::KeyValueStore;

/// Storage key prefix for mirrored cache documents.
const MIRROR_PREFIX: &str = "cache/";

/// One cached result with its absolute expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: CampaignResult,
    /// Epoch milliseconds; absolute so remaining TTL survives restart.
    pub expires_at_epoch_ms: i64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Utc::now().timestamp_millis() >= self.expires_at_epoch_ms
    }
}

/// Hit/miss counters owned by the cache instance.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Hybrid in-memory/durable result cache.
pub struct ResultCache {
    inner: Mutex<CacheInner>,
    store: Arc<dyn KeyValueStore>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                hits: 0,
                misses: 0,
            }),
            store,
        }
    }

    fn mirror_key(key: &str) -> String {
        format!("{MIRROR_PREFIX}{key}")
    }

    /// Look up a fresh entry. Memory only; a miss is a plain `None`.
    pub async fn get(&self, key: &str) -> Option<CampaignResult> {
        let expired = {
            let mut guard = self.inner.lock().await;
            // Reborrow for disjoint borrows of the counters and the map.
            let inner = &mut *guard;
            match inner.entries.get(key) {
                Some(entry) if !entry.is_expired() => {
                    inner.hits += 1;
                    return Some(entry.value.clone());
                }
                Some(_) => {
                    inner.entries.remove(key);
                    inner.misses += 1;
                    true
                }
                None => {
                    inner.misses += 1;
                    false
                }
            }
        };
        if expired {
            self.spawn_mirror_delete(key);
        }
        None
    }

    /// Insert with a TTL and mirror to durable storage.
    pub async fn set(&self, key: &str, value: CampaignResult, ttl_seconds: u64) {
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            expires_at_epoch_ms: Utc::now().timestamp_millis() + (ttl_seconds as i64) * 1000,
        };

        {
            let mut inner = self.inner.lock().await;
            inner.entries.insert(key.to_string(), entry.clone());
        }

        // Best effort: the cache stays correct in memory even if this fails.
        match serde_json::to_value(&entry) {
            Ok(doc) => {
                if let Err(e) = self.store.save(&Self::mirror_key(key), &doc).await {
                    warn!("Failed to mirror cache entry '{}': {}", key, e);
                }
            }
            Err(e) => warn!("Failed to serialize cache entry '{}': {}", key, e),
        }
    }

    /// Drop an entry from memory and its durable mirror.
    pub async fn invalidate(&self, key: &str) {
        let removed = {
            let mut inner = self.inner.lock().await;
            inner.entries.remove(key).is_some()
        };
        if removed {
            debug!("Invalidated cache entry '{}'", key);
        }
        if let Err(e) = self.store.delete(&Self::mirror_key(key)).await {
            warn!("Failed to delete cache mirror for '{}': {}", key, e);
        }
    }

    /// Drop every entry, memory and durable mirror both.
    pub async fn clear(&self) -> usize {
        let removed = {
            let mut inner = self.inner.lock().await;
            let n = inner.entries.len();
            inner.entries.clear();
            n
        };
        if let Err(e) = self.store.clear(Some(MIRROR_PREFIX)).await {
            warn!("Failed to clear cache mirror: {}", e);
        }
        removed
    }

    /// Rehydrate memory from the durable mirror at startup.
    ///
    /// Entries whose absolute expiry already passed are not loaded; their
    /// mirror documents are deleted instead.
    pub async fn load_from_storage(&self) -> Result<usize, ScrapeError> {
        let keys = self.store.list_keys(Some(MIRROR_PREFIX)).await?;
        let mut loaded = 0usize;
        let mut dropped = 0usize;

        for storage_key in keys {
            let Some(doc) = self.store.get(&storage_key).await? else {
                continue;
            };
            let entry: CacheEntry = match serde_json::from_value(doc) {
                Ok(e) => e,
                Err(e) => {
                    warn!("Skipping corrupt cache mirror '{}': {}", storage_key, e);
                    continue;
                }
            };

            if entry.is_expired() {
                dropped += 1;
                if let Err(e) = self.store.delete(&storage_key).await {
                    warn!("Failed to delete expired mirror '{}': {}", storage_key, e);
                }
                continue;
            }

            let mut inner = self.inner.lock().await;
            inner.entries.insert(entry.key.clone(), entry);
            loaded += 1;
        }

        info!("Cache rehydrated: {} entries loaded, {} expired dropped", loaded, dropped);
        Ok(loaded)
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.entries.len(),
        }
    }

    fn spawn_mirror_delete(&self, key: &str) {
        let store = Arc::clone(&self.store);
        let mirror_key = Self::mirror_key(key);
        let key = key.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.delete(&mirror_key).await {
                warn!("Failed to delete expired mirror for '{}': {}", key, e);
            } else {
                debug!("Deleted expired cache mirror for '{}'", key);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DiscountType;
    use crate::storage::FileStore;
    use tempfile::tempdir;

    fn result(id: &str) -> CampaignResult {
        CampaignResult::new(
            id.into(),
            "20% off".into(),
            String::new(),
            DiscountType::Percentage,
            20.0,
        )
    }

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let dir = tempdir().unwrap();
        let cache = ResultCache::new(Arc::new(FileStore::new(dir.path())));

        cache.set("k1", result("c1"), 60).await;
        let got = cache.get("k1").await.unwrap();
        assert_eq!(got.id, "c1");

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn repeated_hits_count_and_keep_the_entry() {
        let dir = tempdir().unwrap();
        let cache = ResultCache::new(Arc::new(FileStore::new(dir.path())));

        cache.set("k1", result("c1"), 60).await;
        for _ in 0..3 {
            assert_eq!(cache.get("k1").await.unwrap().id, "c1");
        }
        assert!(cache.get("other").await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn miss_increments_counter() {
        let dir = tempdir().unwrap();
        let cache = ResultCache::new(Arc::new(FileStore::new(dir.path())));

        assert!(cache.get("absent").await.is_none());
        assert_eq!(cache.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_misses_and_mirror_is_deleted() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let cache = ResultCache::new(store.clone());

        cache.set("k1", result("c1"), 0).await;
        // ttl 0 expires immediately
        assert!(cache.get("k1").await.is_none());

        // The mirror delete runs on a spawned task; yield until it lands.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if store.get("cache/k1").await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(store.get("cache/k1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rehydrates_live_entries_and_drops_expired() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));

        {
            let cache = ResultCache::new(store.clone());
            cache.set("live", result("c1"), 3600).await;
            cache.set("stale", result("c2"), 0).await;
        }

        let cache = ResultCache::new(store.clone());
        let loaded = cache.load_from_storage().await.unwrap();
        assert_eq!(loaded, 1);
        assert!(cache.get("live").await.is_some());
        assert!(cache.get("stale").await.is_none());
        assert!(store.get("cache/stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalidate_removes_memory_and_mirror() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::new(dir.path()));
        let cache = ResultCache::new(store.clone());

        cache.set("k1", result("c1"), 3600).await;
        cache.invalidate("k1").await;

        assert!(cache.get("k1").await.is_none());
        assert!(store.get("cache/k1").await.unwrap().is_none());
    }
}
