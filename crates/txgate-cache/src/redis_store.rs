//! Shared (L2) store on Redis hashes.
//!
//! Each cache key is a Redis hash; fields hold the variants. `set` writes the
//! field and refreshes the TTL of the whole hash in one pipeline, so a key
//! lives as long as its most recently written field.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;

use crate::backend::KeyValueCache;
use crate::error::CacheError;

/// Multi-instance store backed by a deadpool Redis pool.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.hget(key, field).await?;
        tracing::debug!(key = %key, field = %field, hit = value.is_some(), "cache get (redis)");
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        field: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let ttl_secs = ttl.as_secs().max(1) as i64;
        let _: () = redis::pipe()
            .atomic()
            .hset(key, field, value)
            .ignore()
            .expire(key, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        tracing::debug!(key = %key, field = %field, ttl_secs = %ttl_secs, "cache set (redis)");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        tracing::debug!(key = %key, "cache key deleted (redis)");
        Ok(())
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        conn.hdel::<_, _, ()>(key, field).await?;
        tracing::debug!(key = %key, field = %field, "cache field deleted (redis)");
        Ok(())
    }

    async fn incr(&self, key: &str, field: &str, ttl: Duration) -> Result<i64, CacheError> {
        let mut conn = self.pool.get().await?;
        let ttl_secs = ttl.as_secs().max(1) as i64;
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .hincr(key, field, 1)
            .expire(key, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await?;
        tracing::debug!(key = %key, field = %field, value, "cache counter incremented (redis)");
        Ok(value)
    }

    fn mode(&self) -> &'static str {
        "redis"
    }
}
