//! Event-driven cache invalidation for the transaction gateway.
//!
//! ```text
//! queue (Redis stream / in-memory)
//!    ↓ one subscription per topic
//! SubscriptionMultiplexer ──→ handler, handler, …
//!    ↓
//! InvalidationEventConsumer
//!    ├─ decode (malformed → rejected, acked)
//!    ├─ eligibility (unsupported chain → housekeeping, acked)
//!    └─ settle_all ─┬─ CacheEvictor        (eviction table)
//!                   └─ NotificationDispatcher (idempotent jobs)
//! ```

pub mod eligibility;
pub mod error;
pub mod eviction;
pub mod housekeeping;
pub mod invalidation;
pub mod metrics;
pub mod multiplexer;
pub mod notifications;
pub mod queue;
pub mod redis_stream;
pub mod settle;

pub use eligibility::{ChainEligibility, ConfigServiceEligibility, StaticChainEligibility};
pub use error::{EvictionError, HandlerError, NotificationError, QueueError};
pub use eviction::{CacheEvictor, evicted_kinds, eviction_targets};
pub use housekeeping::{ChainHousekeeping, UnsupportedEventTracker};
pub use invalidation::{InvalidationEventConsumer, MessageOutcome, PipelineStatus, ProcessReport};
pub use multiplexer::SubscriptionMultiplexer;
pub use notifications::{
    InMemoryNotificationQueue, NotificationDispatcher, NotificationJob, NotificationKind,
    NotificationQueue, RedisNotificationQueue,
};
pub use queue::{InMemoryQueue, MessageHandler, MessageQueue};
pub use redis_stream::{RedisStreamQueue, StreamConsumerConfig};
pub use settle::{Outcome, Settled, settle_all};
