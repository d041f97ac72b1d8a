//! Error types for transports, handlers and side-effect pipelines.

use thiserror::Error;
use txgate_cache::CacheError;
use txgate_core::CoreError;

/// Failure of the message queue transport.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue pool error: {0}")]
    Pool(String),

    #[error("Queue connection error: {0}")]
    Connection(String),

    #[error("Queue subscribe error: {0}")]
    Subscribe(String),

    #[error("Queue publish error: {0}")]
    Publish(String),

    #[error("Queue message error: {0}")]
    Message(String),

    #[error("Queue is closed")]
    Closed,
}

impl From<deadpool_redis::PoolError> for QueueError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

/// A message handler failed; the transport logs it and decides on ack.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One or more evictions for an event failed.
#[derive(Debug, Error)]
#[error("{failed} of {total} evictions failed: {first}")]
pub struct EvictionError {
    pub failed: usize,
    pub total: usize,
    pub first: CacheError,
}

/// Failure to build or enqueue a notification job.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Notification queue pool error: {0}")]
    Pool(String),

    #[error("Notification queue command error: {0}")]
    Command(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<deadpool_redis::PoolError> for NotificationError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

impl From<redis::RedisError> for NotificationError {
    fn from(e: redis::RedisError) -> Self {
        Self::Command(e.to_string())
    }
}

impl From<CoreError> for NotificationError {
    fn from(e: CoreError) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
