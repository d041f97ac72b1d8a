//! Cache-aside read path for the transaction gateway.
//!
//! ## Architecture
//!
//! ```text
//! request → CacheDirectory → CacheFirstFetcher ──hit──→ caller
//!                                  │ miss
//!                                  ↓
//!                        RequestDeduplicator → producer (HTTP)
//!                                  │
//!                                  ↓
//!                     CacheService (envelope + generation) → KeyValueCache
//! ```
//!
//! - **KeyValueCache**: `LocalCache` (DashMap, per instance) or `RedisCache`
//!   (shared across instances).
//! - **Negative caching**: confirmed absences are cached with a TTL no longer
//!   than the fresh TTL; transient failures are never cached.
//!
//! ## Graceful Degradation
//!
//! Store failures on read fall through to upstream, store failures on write
//! are logged and swallowed. Losing the store costs latency, not correctness.

pub mod backend;
pub mod dedup;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod network;
pub mod redis_store;
pub mod service;

pub use backend::{CachedEntry, KeyValueCache, LocalCache};
pub use dedup::{Cancelled, RequestDeduplicator};
pub use directory::{
    CacheAddress, CacheDir, CacheDirectory, CacheTtl, InvalidationTarget, Pagination,
    ResourceKind, TtlPolicy,
};
pub use envelope::CachedRecord;
pub use error::{CacheError, DataSourceError};
pub use fetcher::{CacheFirstFetcher, Raw};
pub use network::NetworkClient;
pub use redis_store::RedisCache;
pub use service::CacheService;
