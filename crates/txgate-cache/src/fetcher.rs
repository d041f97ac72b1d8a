//! Cache-first read path shared by every provider-backed data source.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::dedup::RequestDeduplicator;
use crate::directory::CacheDir;
use crate::envelope::CachedRecord;
use crate::error::{CacheError, DataSourceError};
use crate::metrics;
use crate::service::CacheService;

/// Provider payload as returned to callers.
pub type Raw = Arc<Value>;

/// Looks up the cache, and on a miss runs the producer exactly once per
/// address across concurrent callers, caching found and not-found outcomes.
///
/// Cache hits never touch the in-flight registry. The cache write happens
/// inside the shared computation, before its registry entry is released, so
/// callers arriving after settlement are served from the cache.
#[derive(Clone)]
pub struct CacheFirstFetcher {
    cache: CacheService,
    inflight: RequestDeduplicator<Raw, DataSourceError>,
}

impl CacheFirstFetcher {
    pub fn new(cache: CacheService) -> Self {
        Self {
            cache,
            inflight: RequestDeduplicator::new(),
        }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    /// Number of upstream computations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.in_flight()
    }

    /// Return the resource at `dir`, calling `producer` only on a full miss.
    ///
    /// `producer` is lazy: it is dropped unpolled when a cached value exists
    /// or another caller already runs the same request. A not-found outcome
    /// is cached for `dir.ttl.not_found`; other failures are never cached.
    pub async fn get<F>(&self, dir: &CacheDir, producer: F) -> Result<Raw, DataSourceError>
    where
        F: Future<Output = Result<Value, DataSourceError>> + Send + 'static,
    {
        match self.cache.read(&dir.address).await {
            Ok(Some(record)) => match record.value() {
                Ok(Some(value)) => {
                    metrics::record_hit(dir.kind);
                    return Ok(Arc::new(value));
                }
                Ok(None) => {
                    metrics::record_negative_hit(dir.kind);
                    return Err(DataSourceError::not_found(dir.address.to_string()));
                }
                Err(e) => {
                    tracing::warn!(address = %dir.address, error = %e, "Cached payload is not valid JSON");
                }
            },
            Ok(None) => {}
            Err(e) => {
                metrics::record_store_error("read");
                tracing::warn!(address = %dir.address, error = %e, "Cache read failed, falling back to upstream");
            }
        }

        metrics::record_miss(dir.kind);

        let cache = self.cache.clone();
        let dir_owned = dir.clone();
        let computation = async move {
            let seen = cache.generation(&dir_owned.address.key).await;
            let result = producer.await;
            match &result {
                Ok(value) => {
                    let record = CachedRecord::found(value, dir_owned.ttl.fresh);
                    store(&cache, &dir_owned, record, seen).await;
                }
                Err(e) if e.is_not_found() => {
                    let record = CachedRecord::not_found(dir_owned.ttl.not_found);
                    store(&cache, &dir_owned, record, seen).await;
                }
                Err(e) => {
                    tracing::debug!(address = %dir_owned.address, error = %e, "Upstream failure not cached");
                }
            }
            result.map(Arc::new)
        };

        self.inflight
            .register(&dir.address.dedup_key(), computation)
            .await
    }

    /// Like [`get`](Self::get), deserializing the payload into `T`.
    pub async fn get_as<T, F>(&self, dir: &CacheDir, producer: F) -> Result<T, DataSourceError>
    where
        T: DeserializeOwned,
        F: Future<Output = Result<Value, DataSourceError>> + Send + 'static,
    {
        let raw = self.get(dir, producer).await?;
        T::deserialize(raw.as_ref()).map_err(|e| {
            DataSourceError::upstream(format!("unexpected payload for {}: {e}", dir.address))
        })
    }
}

/// Write `record` unless the family was invalidated after the fetch began.
///
/// `seen` is the family generation read before the producer ran. It is
/// compared again before the write and once more after it; an invalidation
/// landing in between removes the just-written entry. Store failures are
/// logged and swallowed.
async fn store(
    cache: &CacheService,
    dir: &CacheDir,
    record: CachedRecord,
    seen: Result<Option<i64>, CacheError>,
) {
    let seen = match seen {
        Ok(generation) => Some(generation),
        Err(e) => {
            tracing::debug!(address = %dir.address, error = %e, "Invalidation generation unreadable, writing anyway");
            None
        }
    };

    if let Some(seen) = seen {
        if generation_changed(cache, dir, seen).await {
            metrics::record_stale_write_skipped(dir.kind);
            tracing::debug!(
                address = %dir.address,
                "Skipping cache write for result fetched before invalidation"
            );
            return;
        }
    }

    let ttl = if record.is_negative() {
        dir.ttl.not_found
    } else {
        dir.ttl.fresh
    };

    if let Err(e) = cache.write(&dir.address, &record, ttl).await {
        metrics::record_store_error("write");
        tracing::warn!(address = %dir.address, error = %e, "Cache write failed");
        return;
    }

    if let Some(seen) = seen {
        if generation_changed(cache, dir, seen).await {
            metrics::record_stale_write_skipped(dir.kind);
            tracing::debug!(
                address = %dir.address,
                "Invalidated during cache write, removing written entry"
            );
            if let Err(e) = cache.store().delete_field(&dir.address.key, &dir.address.field).await {
                metrics::record_store_error("delete");
                tracing::warn!(address = %dir.address, error = %e, "Failed to remove stale cache entry");
            }
        }
    }
}

/// Whether the family generation moved away from `seen`. An unreadable
/// generation counts as unchanged.
async fn generation_changed(cache: &CacheService, dir: &CacheDir, seen: Option<i64>) -> bool {
    match cache.generation(&dir.address.key).await {
        Ok(current) => current != seen,
        Err(e) => {
            tracing::debug!(address = %dir.address, error = %e, "Invalidation generation unreadable");
            false
        }
    }
}
