//! Process wiring for the txgate data-access layer.
//!
//! ```text
//! load_config ──→ Gateway::build
//!                   ├─ create_cache_backend (Redis, or local fallback)
//!                   ├─ CacheDirectory / CacheService / CacheFirstFetcher
//!                   ├─ InvalidationEventConsumer
//!                   └─ SubscriptionMultiplexer (Redis stream or in-memory)
//!                 Gateway::start ──→ subscribe consumer, spawn housekeeping
//!                 admin::serve   ──→ /health, /metrics
//!                 Gateway::shutdown
//! ```

pub mod admin;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod observability;

pub use admin::{admin_router, serve, shutdown_signal};
pub use config::AppConfig;
pub use gateway::{CacheBackend, Gateway, create_cache_backend};
pub use observability::shutdown_tracing;
