//! In-memory [`KvCache`] backed by a concurrent map.
//!
//! Expired entries are dropped lazily on access and by [`MemoryKvCache::purge_expired`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use geogate_storage::{CacheError, KvCache};
use tokio::time::Instant;

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone, Default)]
pub struct MemoryKvCache {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryKvCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }
}

#[async_trait]
impl KvCache for MemoryKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|e| e.is_live(now).then(|| e.value.clone()));
        match live {
            Some(Some(v)) => Ok(Some(v)),
            Some(None) => {
                self.entries.remove_if(key, |_, e| !e.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: now + ttl,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: "0".to_string(),
                expires_at: now + ttl,
            };
        }
        let next = entry
            .value
            .parse::<u64>()
            .map_err(|e| CacheError::Backend(format!("counter {key}: {e}")))?
            + 1;
        entry.value = next.to_string();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryKvCache::new();
        cache
            .set("sms:HTL-000001", "abc".into(), Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(
            cache.get("sms:HTL-000001").await.unwrap().as_deref(),
            Some("abc")
        );
        cache.delete("sms:HTL-000001").await.unwrap();
        assert!(cache.get("sms:HTL-000001").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire() {
        let cache = MemoryKvCache::new();
        cache
            .set("k", "v".into(), Duration::from_secs(10))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn increment_keeps_window_then_resets() {
        let cache = MemoryKvCache::new();
        let hour = Duration::from_secs(3600);
        assert_eq!(cache.increment("rate", hour).await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(1800)).await;
        assert_eq!(cache.increment("rate", hour).await.unwrap(), 2);
        tokio::time::advance(Duration::from_secs(1800)).await;
        // Window opened by the first increment has closed.
        assert_eq!(cache.increment("rate", hour).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let cache = MemoryKvCache::new();
        cache
            .set("short", "1".into(), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set("long", "2".into(), Duration::from_secs(100))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.get("long").await.unwrap().is_some());
    }
}
