//! Redis Streams transport for multi-instance deployments.
//!
//! Each subscribed topic is a stream read through a consumer group, so every
//! event is handled by one instance of the group:
//!
//! 1. `XGROUP CREATE … MKSTREAM` (an existing group is fine)
//! 2. Entries left pending by a previous run of this consumer are re-read
//! 3. New entries are read with `XREADGROUP … BLOCK`
//! 4. `XACK` once the handler returned `Ok`; failed entries stay pending and
//!    are redelivered on the next start
//!
//! The reader reconnects with exponential backoff if the connection is lost.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::streams::{StreamReadOptions, StreamReadReply};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::queue::{MessageHandler, MessageQueue};

/// Stream entry field holding the raw event payload.
pub const PAYLOAD_FIELD: &str = "payload";

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct StreamConsumerConfig {
    pub group: String,
    pub consumer: String,
    pub block: Duration,
    pub batch_size: usize,
}

pub struct RedisStreamQueue {
    pool: Pool,
    redis_url: String,
    config: StreamConsumerConfig,
    shutdown_tx: watch::Sender<bool>,
    readers: Mutex<Vec<JoinHandle<()>>>,
}

impl RedisStreamQueue {
    /// `redis_url` opens the dedicated blocking-read connections; `pool`
    /// serves publishing and acknowledgements.
    pub fn new(pool: Pool, redis_url: impl Into<String>, config: StreamConsumerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pool,
            redis_url: redis_url.into(),
            config,
            shutdown_tx,
            readers: Mutex::new(Vec::new()),
        }
    }

    /// Append `payload` to the `topic` stream.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<String, QueueError> {
        let mut conn = self.pool.get().await?;
        let id: String = conn
            .xadd(topic, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(|e| QueueError::Publish(e.to_string()))?;
        debug!(topic = %topic, id = %id, "Published event to stream");
        Ok(id)
    }

    async fn ensure_group(&self, topic: &str) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(topic, &self.config.group, "$")
            .await;
        match created {
            Ok(()) => {
                info!(topic = %topic, group = %self.config.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(QueueError::Subscribe(e.to_string())),
        }
    }
}

#[async_trait]
impl MessageQueue for RedisStreamQueue {
    async fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), QueueError> {
        if *self.shutdown_tx.borrow() {
            return Err(QueueError::Closed);
        }
        self.ensure_group(topic).await?;

        let reader = StreamReader {
            topic: topic.to_string(),
            redis_url: self.redis_url.clone(),
            pool: self.pool.clone(),
            config: self.config.clone(),
            handler,
        };
        let handle = tokio::spawn(reader.run(self.shutdown_tx.subscribe()));
        self.readers.lock().push(handle);
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.shutdown_tx.send_replace(true);
        let readers: Vec<_> = self.readers.lock().drain(..).collect();
        for reader in readers {
            if let Err(e) = reader.await {
                warn!(error = %e, "Stream reader ended abnormally");
            }
        }
        info!("Stream readers stopped");
        Ok(())
    }

    fn mode(&self) -> &'static str {
        "redis"
    }
}

/// Background reader for one topic.
struct StreamReader {
    topic: String,
    redis_url: String,
    pool: Pool,
    config: StreamConsumerConfig,
    handler: Arc<dyn MessageHandler>,
}

impl StreamReader {
    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(topic = %self.topic, consumer = %self.config.consumer, "Starting stream reader");
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let result = tokio::select! {
                result = self.read_loop() => result,
                _ = shutdown_rx.changed() => break,
            };

            if let Err(e) = result {
                error!(
                    topic = %self.topic,
                    error = %e,
                    backoff_secs = backoff.as_secs(),
                    "Stream reader error, reconnecting..."
                );
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = shutdown_rx.changed() => break,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            } else {
                backoff = INITIAL_BACKOFF;
            }
        }
        info!(topic = %self.topic, "Stream reader stopped");
    }

    async fn read_loop(&self) -> Result<(), QueueError> {
        let client = redis::Client::open(self.redis_url.as_str())
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        // Drain our own pending entries first, then switch to new ones.
        let mut cursor = "0".to_string();
        loop {
            let mut options = StreamReadOptions::default()
                .group(&self.config.group, &self.config.consumer)
                .count(self.config.batch_size);
            if cursor == ">" {
                options = options.block(self.config.block.as_millis() as usize);
            }

            let reply: Option<StreamReadReply> = conn
                .xread_options(&[&self.topic], &[&cursor], &options)
                .await
                .map_err(|e| QueueError::Message(e.to_string()))?;

            let entries: Vec<_> = reply
                .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
                .unwrap_or_default();

            if entries.is_empty() {
                if cursor != ">" {
                    debug!(topic = %self.topic, "Pending entries drained");
                    cursor = ">".to_string();
                }
                continue;
            }

            for entry in entries {
                if cursor != ">" {
                    cursor = entry.id.clone();
                }
                self.deliver(&entry.id, entry.get::<Vec<u8>>(PAYLOAD_FIELD))
                    .await?;
            }
        }
    }

    async fn deliver(&self, id: &str, payload: Option<Vec<u8>>) -> Result<(), QueueError> {
        let Some(payload) = payload else {
            warn!(topic = %self.topic, id = %id, "Stream entry without payload, acknowledging");
            return self.ack(id).await;
        };

        match self.handler.handle(&payload).await {
            Ok(()) => self.ack(id).await,
            Err(e) => {
                warn!(topic = %self.topic, id = %id, error = %e, "Handler failed, leaving entry pending");
                Ok(())
            }
        }
    }

    async fn ack(&self, id: &str) -> Result<(), QueueError> {
        let mut conn = self.pool.get().await?;
        conn.xack::<_, _, _, ()>(&self.topic, &self.config.group, &[id])
            .await
            .map_err(|e| QueueError::Message(e.to_string()))
    }
}
