//! Key-value store boundary and the in-process (L1) implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::error::CacheError;

/// Generic hash-style key-value store with TTL support.
///
/// A `key` groups a resource family, a `field` selects one variant inside
/// it. Deleting an absent key or field is a no-op. Implementations never
/// return an entry whose TTL has elapsed.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Get the value stored under `key`/`field`.
    async fn get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`/`field` for `ttl`.
    async fn set(&self, key: &str, field: &str, value: Vec<u8>, ttl: Duration)
    -> Result<(), CacheError>;

    /// Delete every field stored under `key`.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete a single field stored under `key`.
    async fn delete_field(&self, key: &str, field: &str) -> Result<(), CacheError>;

    /// Atomically add one to the decimal counter under `key`/`field` and
    /// return the new value. An absent or elapsed counter starts from zero.
    /// `ttl` is refreshed on every increment.
    async fn incr(&self, key: &str, field: &str, ttl: Duration) -> Result<i64, CacheError>;

    /// Short backend name for logs and health checks.
    fn mode(&self) -> &'static str;

    /// Drop expired entries.
    ///
    /// Default implementation is a no-op (for backends like Redis with native TTL).
    fn cleanup_expired(&self) -> usize {
        0
    }
}

/// A cached value with TTL support.
///
/// Expiry is measured with `tokio::time::Instant`, so tests driving a paused
/// runtime clock observe expiry deterministically.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    /// Create a new cached entry.
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    /// Check if this entry has expired.
    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Single-instance store backed by a `DashMap` of field maps.
#[derive(Clone, Default)]
pub struct LocalCache {
    entries: Arc<DashMap<String, HashMap<String, CachedEntry>>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live fields across all keys.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|fields| fields.values().filter(|e| !e.is_expired()).count())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key`/`field` currently holds a live value.
    pub fn contains(&self, key: &str, field: &str) -> bool {
        self.entries
            .get(key)
            .and_then(|fields| fields.get(field).map(|e| !e.is_expired()))
            .unwrap_or(false)
    }

    /// Whether any live field exists under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|fields| fields.values().any(|e| !e.is_expired()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl KeyValueCache for LocalCache {
    async fn get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(fields) => match fields.get(field) {
                Some(entry) if !entry.is_expired() => {
                    return Ok(Some(entry.data.as_ref().clone()));
                }
                Some(_) => true,
                None => false,
            },
        };

        if expired {
            // Remove expired entry
            if let Some(mut fields) = self.entries.get_mut(key) {
                fields.retain(|_, e| !e.is_expired());
            }
            self.entries.remove_if(key, |_, fields| fields.is_empty());
        }
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        field: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.entries
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), CachedEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        tracing::debug!(key = %key, "cache key deleted (local)");
        Ok(())
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<(), CacheError> {
        if let Some(mut fields) = self.entries.get_mut(key) {
            fields.remove(field);
        }
        self.entries.remove_if(key, |_, fields| fields.is_empty());
        tracing::debug!(key = %key, field = %field, "cache field deleted (local)");
        Ok(())
    }

    async fn incr(&self, key: &str, field: &str, ttl: Duration) -> Result<i64, CacheError> {
        // The entry guard holds the shard lock for the whole read-modify-write
        let mut fields = self.entries.entry(key.to_string()).or_default();
        let current = match fields.get(field).filter(|e| !e.is_expired()) {
            Some(entry) => std::str::from_utf8(&entry.data)
                .ok()
                .and_then(|text| text.parse::<i64>().ok())
                .ok_or_else(|| {
                    CacheError::Command(format!("value at {key}/{field} is not an integer"))
                })?,
            None => 0,
        };
        let next = current + 1;
        fields.insert(
            field.to_string(),
            CachedEntry::new(next.to_string().into_bytes(), ttl),
        );
        Ok(next)
    }

    fn mode(&self) -> &'static str {
        "local"
    }

    fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        for mut fields in self.entries.iter_mut() {
            let before = fields.len();
            fields.retain(|_, e| !e.is_expired());
            removed += before - fields.len();
        }
        self.entries.retain(|_, fields| !fields.is_empty());
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_cache_get_set() {
        let cache = LocalCache::new();

        cache
            .set("1_balances_0xabc", "usd", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        let value = cache.get("1_balances_0xabc", "usd").await.unwrap();
        assert_eq!(value, Some(b"value".to_vec()));
        assert_eq!(cache.get("1_balances_0xabc", "eur").await.unwrap(), None);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_cache_expiration() {
        let cache = LocalCache::new();

        cache
            .set("k", "f", b"value".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(cache.get("k", "f").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(cache.get("k", "f").await.unwrap().is_none());
        assert!(!cache.contains_key("k"));
    }

    #[tokio::test]
    async fn test_delete_key_removes_all_fields() {
        let cache = LocalCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("k", "a", b"1".to_vec(), ttl).await.unwrap();
        cache.set("k", "b", b"2".to_vec(), ttl).await.unwrap();
        cache.set("other", "a", b"3".to_vec(), ttl).await.unwrap();

        cache.delete("k").await.unwrap();

        assert!(!cache.contains_key("k"));
        assert!(cache.contains("other", "a"));
    }

    #[tokio::test]
    async fn test_delete_field_keeps_siblings() {
        let cache = LocalCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("k", "a", b"1".to_vec(), ttl).await.unwrap();
        cache.set("k", "b", b"2".to_vec(), ttl).await.unwrap();

        cache.delete_field("k", "a").await.unwrap();

        assert!(!cache.contains("k", "a"));
        assert!(cache.contains("k", "b"));
    }

    #[tokio::test]
    async fn test_deleting_absent_entries_is_noop() {
        let cache = LocalCache::new();
        cache.delete("missing").await.unwrap();
        cache.delete_field("missing", "field").await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_incr_counts_from_zero() {
        let cache = LocalCache::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.incr("k_generation", "gen", ttl).await.unwrap(), 1);
        assert_eq!(cache.incr("k_generation", "gen", ttl).await.unwrap(), 2);
        assert_eq!(
            cache.get("k_generation", "gen").await.unwrap(),
            Some(b"2".to_vec())
        );

        cache.set("k", "text", b"abc".to_vec(), ttl).await.unwrap();
        assert!(cache.incr("k", "text", ttl).await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_incr_loses_no_update() {
        let cache = LocalCache::new();
        let ttl = Duration::from_secs(60);

        let tasks = (0..50).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.incr("k", "gen", ttl).await.unwrap() })
        });
        let mut seen: Vec<i64> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        seen.sort_unstable();

        assert_eq!(seen, (1..=50).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_restarts_after_expiry() {
        let cache = LocalCache::new();
        cache.incr("k", "gen", Duration::from_secs(5)).await.unwrap();
        cache.incr("k", "gen", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.incr("k", "gen", Duration::from_secs(5)).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let cache = LocalCache::new();
        cache
            .set("short", "f", b"1".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        cache
            .set("long", "f", b"2".to_vec(), Duration::from_secs(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.contains("long", "f"));
        assert!(!cache.contains_key("short"));
    }
}
