//! Message queue boundary and the in-process transport.
//!
//! Delivery is at-least-once. A handler returning (with `Ok` or `Err`) is the
//! acknowledgement signal; transports decide what an `Err` means for
//! redelivery.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{HandlerError, QueueError};

/// Receives raw message payloads for one topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Get the handler's unique name for logging.
    fn name(&self) -> &str;

    /// Handle one delivered message.
    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

/// Transport that delivers messages from named topics.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Open a subscription on `topic` delivering to `handler`.
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError>;

    /// Tear down every subscription opened through this queue.
    async fn close(&self) -> Result<(), QueueError>;

    /// Short transport name for logs and health checks.
    fn mode(&self) -> &'static str;
}

/// Single-process transport; `publish` delivers synchronously to every
/// subscription on the topic and returns once all handlers completed.
#[derive(Default)]
pub struct InMemoryQueue {
    subscriptions: RwLock<HashMap<String, Vec<Arc<dyn MessageHandler>>>>,
    subscribe_calls: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `payload` to every subscription on `topic`.
    ///
    /// Returns the number of subscriptions that received the message.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<usize, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let handlers = self
            .subscriptions
            .read()
            .get(topic)
            .cloned()
            .unwrap_or_default();

        for handler in &handlers {
            if let Err(e) = handler.handle(payload).await {
                tracing::warn!(topic = %topic, handler = %handler.name(), error = %e, "Message handler failed");
            }
        }
        Ok(handlers.len())
    }

    /// Number of underlying subscriptions on `topic`.
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.subscriptions
            .read()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Total number of `subscribe` calls received.
    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(topic = %topic, handler = %handler.name(), "Subscribed (in-memory)");
        self.subscriptions
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.store(true, Ordering::SeqCst);
        self.subscriptions.write().clear();
        Ok(())
    }

    fn mode(&self) -> &'static str {
        "memory"
    }
}
