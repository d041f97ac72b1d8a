//! Envelope-aware access to the key-value store.
//!
//! Every read and write of cached upstream data goes through
//! [`CacheService`]. It decodes envelopes, drops unreadable or elapsed
//! entries, and bumps a per-family invalidation generation so a fetch that
//! started before an invalidation cannot repopulate the evicted family with
//! stale data.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::KeyValueCache;
use crate::directory::{CacheAddress, InvalidationTarget};
use crate::envelope::CachedRecord;
use crate::error::CacheError;

const GENERATION_FIELD: &str = "gen";

/// Shared handle over the configured [`KeyValueCache`].
#[derive(Clone)]
pub struct CacheService {
    store: Arc<dyn KeyValueCache>,
    marker_ttl: Duration,
}

impl CacheService {
    pub fn new(store: Arc<dyn KeyValueCache>, marker_ttl: Duration) -> Self {
        Self { store, marker_ttl }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueCache> {
        &self.store
    }

    pub fn mode(&self) -> &'static str {
        self.store.mode()
    }

    /// Read the live envelope at `address`.
    ///
    /// Store failures are returned to the caller; an undecodable envelope is
    /// deleted and reported as absent, as is an elapsed one.
    pub async fn read(&self, address: &CacheAddress) -> Result<Option<CachedRecord>, CacheError> {
        let Some(bytes) = self.store.get(&address.key, &address.field).await? else {
            return Ok(None);
        };

        match CachedRecord::decode(&bytes) {
            Ok(record) if record.is_expired() => Ok(None),
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Dropping undecodable cache entry");
                self.store.delete_field(&address.key, &address.field).await?;
                Ok(None)
            }
        }
    }

    /// Store `record` at `address` for `ttl`.
    pub async fn write(
        &self,
        address: &CacheAddress,
        record: &CachedRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let bytes = record.encode()?;
        self.store
            .set(&address.key, &address.field, bytes, ttl)
            .await
    }

    /// Evict a family or a single variant.
    ///
    /// The family generation is incremented before the delete. A fetch that
    /// read the generation before this call and writes after it finds the
    /// generation changed when it checks again after its write, and removes
    /// the entry itself. Deleting absent entries succeeds.
    pub async fn invalidate(&self, target: &InvalidationTarget) -> Result<(), CacheError> {
        self.store
            .incr(&generation_key(&target.key), GENERATION_FIELD, self.marker_ttl)
            .await?;

        match &target.field {
            Some(field) => self.store.delete_field(&target.key, field).await?,
            None => self.store.delete(&target.key).await?,
        }
        tracing::debug!(target = %target, "cache invalidated");
        Ok(())
    }

    /// Invalidation generation of the family `key`; `None` until the first
    /// invalidation or after the counter's TTL elapses.
    ///
    /// Only equality between two reads is meaningful.
    pub async fn generation(&self, key: &str) -> Result<Option<i64>, CacheError> {
        let raw = self.store.get(&generation_key(key), GENERATION_FIELD).await?;
        Ok(raw.and_then(|bytes| std::str::from_utf8(&bytes).ok()?.parse().ok()))
    }
}

fn generation_key(key: &str) -> String {
    format!("{key}_generation")
}
