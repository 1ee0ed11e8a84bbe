//! Generic keyed cache with per-entry expiry
//!
//! A [`CacheStore`] only persists and returns entries; deciding whether an
//! entry is still fresh is the caller's job, using its own clock. Writes are
//! last-writer-wins upserts.

use crate::error::Result;
use crate::models::LyricsCacheEntry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A value that can live in a [`CacheStore`].
pub trait CacheEntry: Clone + Send + Sync + 'static {
    /// Unique key of the entry
    fn cache_key(&self) -> &str;

    /// Unix seconds after which the entry is stale
    fn expires_at(&self) -> i64;

    /// Whether the entry records the absence of a result
    fn is_negative(&self) -> bool {
        false
    }

    fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at()
    }
}

impl CacheEntry for LyricsCacheEntry {
    fn cache_key(&self) -> &str {
        &self.id
    }

    fn expires_at(&self) -> i64 {
        self.expires_at
    }

    fn is_negative(&self) -> bool {
        LyricsCacheEntry::is_negative(self)
    }
}

/// Entry counts reported by [`CacheStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total: u64,
    pub negative: u64,
    pub expired: u64,
}

/// Keyed persistence for cache entries.
#[async_trait::async_trait]
pub trait CacheStore<V: CacheEntry>: Send + Sync {
    /// Fetch an entry by key, expired or not.
    async fn get(&self, key: &str) -> Result<Option<V>>;

    /// Insert or replace the entry with the same key.
    async fn upsert(&self, entry: &V) -> Result<()>;

    /// Remove an entry. Returns `true` if it existed.
    async fn remove(&self, key: &str) -> Result<bool>;

    /// Physically delete entries with `expires_at < now`. Returns the number removed.
    async fn purge_expired(&self, now: i64) -> Result<u64>;

    /// Counts of all, negative and expired entries as of `now`.
    async fn stats(&self, now: i64) -> Result<CacheStats>;
}

/// Process-local [`CacheStore`].
pub struct InMemoryCacheStore<V> {
    entries: Arc<RwLock<HashMap<String, V>>>,
}

impl<V> InMemoryCacheStore<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<V> Default for InMemoryCacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for InMemoryCacheStore<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

#[async_trait::async_trait]
impl<V: CacheEntry> CacheStore<V> for InMemoryCacheStore<V> {
    async fn get(&self, key: &str) -> Result<Option<V>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn upsert(&self, entry: &V) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(entry.cache_key().to_string(), entry.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at() >= now);
        Ok((before - entries.len()) as u64)
    }

    async fn stats(&self, now: i64) -> Result<CacheStats> {
        let entries = self.entries.read().await;
        Ok(CacheStats {
            total: entries.len() as u64,
            negative: entries.values().filter(|e| e.is_negative()).count() as u64,
            expired: entries.values().filter(|e| e.is_expired(now)).count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Token {
        key: String,
        expires_at: i64,
        empty: bool,
    }

    impl CacheEntry for Token {
        fn cache_key(&self) -> &str {
            &self.key
        }

        fn expires_at(&self) -> i64 {
            self.expires_at
        }

        fn is_negative(&self) -> bool {
            self.empty
        }
    }

    fn token(key: &str, expires_at: i64, empty: bool) -> Token {
        Token {
            key: key.to_string(),
            expires_at,
            empty,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let store = InMemoryCacheStore::new();
        store.upsert(&token("a", 10, false)).await.unwrap();
        store.upsert(&token("a", 20, true)).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await.unwrap(), Some(token("a", 20, true)));
    }

    #[tokio::test]
    async fn test_get_returns_expired_entries() {
        let store = InMemoryCacheStore::new();
        store.upsert(&token("a", 10, false)).await.unwrap();

        let entry = store.get("a").await.unwrap().unwrap();
        assert!(entry.is_expired(11));
    }

    #[tokio::test]
    async fn test_purge_and_stats() {
        let store = InMemoryCacheStore::new();
        store.upsert(&token("old", 10, true)).await.unwrap();
        store.upsert(&token("edge", 50, false)).await.unwrap();
        store.upsert(&token("new", 100, true)).await.unwrap();

        let stats = store.stats(50).await.unwrap();
        assert_eq!(
            stats,
            CacheStats {
                total: 3,
                negative: 2,
                expired: 1
            }
        );

        assert_eq!(store.purge_expired(50).await.unwrap(), 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("edge").await.unwrap().is_some());
        assert!(store.remove("new").await.unwrap());
        assert!(!store.remove("new").await.unwrap());
    }
}
