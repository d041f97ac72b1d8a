//! One underlying subscription per topic, fanned out to many handlers.
//!
//! Components register interest independently during startup; the first
//! registration for a topic opens the transport subscription, later ones
//! only join the handler list. Every handler sees every message, and a
//! failing or panicking handler does not affect its siblings.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{HandlerError, QueueError};
use crate::queue::{MessageHandler, MessageQueue};

/// Delivery callback registered with the transport for one topic.
struct FanOut {
    name: String,
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
}

impl FanOut {
    fn new(topic: &str) -> Self {
        Self {
            name: format!("multiplexer:{topic}"),
            handlers: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageHandler for FanOut {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let handlers = self.handlers.read().clone();

        let runs = handlers.iter().map(|handler| async move {
            let outcome = AssertUnwindSafe(handler.handle(payload)).catch_unwind().await;
            (handler.name().to_string(), outcome)
        });

        for (handler, outcome) in futures::future::join_all(runs).await {
            match outcome {
                Ok(Ok(())) => debug!(handler = %handler, "Handler completed"),
                Ok(Err(e)) => warn!(handler = %handler, error = %e, "Handler failed"),
                Err(panic) => {
                    let panic_msg = if let Some(s) = panic.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    error!(handler = %handler, panic = %panic_msg, "Handler panicked");
                }
            }
        }

        // Every handler ran; the message is done.
        Ok(())
    }
}

/// Process-wide owner of topic subscriptions.
///
/// Built once by the composition root and shared by reference.
pub struct SubscriptionMultiplexer {
    queue: Arc<dyn MessageQueue>,
    topics: Mutex<HashMap<String, Arc<FanOut>>>,
    closed: AtomicBool,
}

impl SubscriptionMultiplexer {
    pub fn new(queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            queue,
            topics: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Register `handler` for every message on `topic`.
    ///
    /// Opens the transport subscription on first use of the topic. If that
    /// fails nothing is registered and the next call retries.
    pub async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }

        let mut topics = self.topics.lock().await;
        if let Some(fan_out) = topics.get(topic) {
            debug!(topic = %topic, handler = %handler.name(), "Joined existing subscription");
            fan_out.handlers.write().push(handler);
            return Ok(());
        }

        let fan_out = Arc::new(FanOut::new(topic));
        fan_out.handlers.write().push(handler.clone());
        self.queue.subscribe(topic, fan_out.clone()).await?;
        topics.insert(topic.to_string(), fan_out);
        info!(topic = %topic, handler = %handler.name(), transport = self.queue.mode(), "Opened subscription");
        Ok(())
    }

    /// Topics with an open subscription.
    pub async fn topics(&self) -> Vec<String> {
        self.topics.lock().await.keys().cloned().collect()
    }

    /// Number of handlers registered on `topic`.
    pub async fn handler_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .await
            .get(topic)
            .map(|f| f.handlers.read().len())
            .unwrap_or(0)
    }

    /// Close the transport once. Later calls are no-ops.
    pub async fn shutdown(&self) -> Result<(), QueueError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.topics.lock().await.clear();
        self.queue.close().await?;
        info!("Subscriptions closed");
        Ok(())
    }
}

impl std::fmt::Debug for SubscriptionMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionMultiplexer")
            .field("transport", &self.queue.mode())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
