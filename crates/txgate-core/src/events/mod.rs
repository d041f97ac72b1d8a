//! Domain events emitted by the upstream transaction indexer.
//!
//! Events arrive as JSON objects with a `type` discriminator and a numeric
//! string `chainId`; every other field depends on the type. They are consumed
//! by the invalidation pipeline to decide which cache entries to evict and
//! which notifications to enqueue.
//!
//! # Example
//!
//! ```
//! use txgate_core::events::{DomainEvent, EventType};
//!
//! let payload = br#"{"type":"CHAIN_UPDATE","chainId":"1"}"#;
//! let event = DomainEvent::decode(payload).unwrap();
//! assert_eq!(event.event_type(), EventType::ChainUpdate);
//! assert_eq!(event.chain_id().as_str(), "1");
//! ```

pub mod types;

pub use types::{DomainEvent, EventType};
