//! Stored representation of a cached upstream result.
//!
//! Entries are serialized as MessagePack for compact storage. The JSON body
//! is kept as a string so the envelope decodes without knowing the resource
//! shape. A `None` payload is the negative marker: upstream confirmed the
//! resource does not exist.
//!
//! Redis applies TTLs per key, not per field, so every envelope carries its
//! own expiry and readers treat an elapsed envelope as a miss.

use std::time::Duration;

use serde_json::Value;

use crate::error::CacheError;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CachedRecord {
    pub stored_at_ms: i64,
    pub expires_at_ms: i64,
    pub payload: Option<String>,
}

impl CachedRecord {
    pub fn found(value: &Value, ttl: Duration) -> Self {
        Self::at(now_ms(), Some(value.to_string()), ttl)
    }

    pub fn not_found(ttl: Duration) -> Self {
        Self::at(now_ms(), None, ttl)
    }

    fn at(stored_at_ms: i64, payload: Option<String>, ttl: Duration) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            stored_at_ms,
            expires_at_ms: stored_at_ms.saturating_add(ttl_ms),
            payload,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.payload.is_none()
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Parse the stored JSON body. `Ok(None)` for a negative marker.
    pub fn value(&self) -> Result<Option<Value>, CacheError> {
        self.payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| CacheError::Codec(e.to_string()))
    }
}

/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> i64 {
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}
