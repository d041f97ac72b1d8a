//! Notification jobs derived from domain events.
//!
//! Jobs are idempotent: the id is a UUIDv5 over the event's canonical JSON,
//! so a redelivered event yields the same id and queues drop the duplicate.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::Pool;
use parking_lot::Mutex;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use txgate_core::{Address, ChainId, DomainEvent};
use uuid::Uuid;

use crate::error::NotificationError;
use crate::metrics;

/// Namespace for notification job ids.
const JOB_NAMESPACE: Uuid = Uuid::from_u128(0x6f1d_2c4a_8e3b_4f7a_9c21_5d8e_0b3a_7e61);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ConfirmationRequest,
    NewConfirmation,
    ExecutedMultisigTransaction,
    ModuleTransaction,
    IncomingEther,
    IncomingToken,
    MessageConfirmationRequest,
}

impl NotificationKind {
    /// Notification sent for an event, if any.
    pub fn for_event(event: &DomainEvent) -> Option<Self> {
        match event {
            DomainEvent::PendingMultisigTransaction { .. } => Some(Self::ConfirmationRequest),
            DomainEvent::NewConfirmation { .. } => Some(Self::NewConfirmation),
            DomainEvent::ExecutedMultisigTransaction { .. } => {
                Some(Self::ExecutedMultisigTransaction)
            }
            DomainEvent::ModuleTransaction { .. } => Some(Self::ModuleTransaction),
            DomainEvent::IncomingEther { .. } => Some(Self::IncomingEther),
            DomainEvent::IncomingToken { .. } => Some(Self::IncomingToken),
            DomainEvent::MessageCreated { .. } => Some(Self::MessageConfirmationRequest),
            _ => None,
        }
    }
}

/// A job for the downstream push-notification worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub chain_id: ChainId,
    pub address: Address,
    pub event: DomainEvent,
}

impl NotificationJob {
    /// Build the job for `event`, or `None` when the event notifies nobody.
    pub fn from_event(event: &DomainEvent) -> Result<Option<Self>, NotificationError> {
        let (Some(kind), Some(address)) = (NotificationKind::for_event(event), event.safe_address())
        else {
            return Ok(None);
        };

        let canonical = event.to_canonical_json()?;
        Ok(Some(Self {
            id: Uuid::new_v5(&JOB_NAMESPACE, &canonical),
            kind,
            chain_id: event.chain_id().clone(),
            address: address.clone(),
            event: event.clone(),
        }))
    }
}

/// Outbound job queue.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Enqueue `job`. Returns `false` when a job with the same id was
    /// already enqueued.
    async fn enqueue(&self, job: &NotificationJob) -> Result<bool, NotificationError>;

    fn mode(&self) -> &'static str;
}

#[derive(Default)]
struct InMemoryState {
    jobs: Vec<NotificationJob>,
    seen: HashSet<Uuid>,
}

/// Single-process queue keeping jobs in memory.
#[derive(Default)]
pub struct InMemoryNotificationQueue {
    state: Mutex<InMemoryState>,
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<NotificationJob> {
        self.state.lock().jobs.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<bool, NotificationError> {
        let mut state = self.state.lock();
        if !state.seen.insert(job.id) {
            return Ok(false);
        }
        state.jobs.push(job.clone());
        Ok(true)
    }

    fn mode(&self) -> &'static str {
        "memory"
    }
}

/// Redis list queue. A `SET NX` marker per job id guards the `RPUSH`.
pub struct RedisNotificationQueue {
    pool: Pool,
    queue_key: String,
    dedup_ttl: Duration,
}

impl RedisNotificationQueue {
    pub fn new(pool: Pool, queue_key: impl Into<String>, dedup_ttl: Duration) -> Self {
        Self {
            pool,
            queue_key: queue_key.into(),
            dedup_ttl,
        }
    }

    fn marker_key(&self, id: &Uuid) -> String {
        format!("{}:dedup:{}", self.queue_key, id)
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn enqueue(&self, job: &NotificationJob) -> Result<bool, NotificationError> {
        let payload = serde_json::to_string(job)?;
        let marker = self.marker_key(&job.id);
        let mut conn = self.pool.get().await?;

        let inserted: Option<String> = redis::cmd("SET")
            .arg(&marker)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.dedup_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if inserted.is_none() {
            tracing::debug!(job_id = %job.id, "Duplicate notification job dropped");
            return Ok(false);
        }

        if let Err(e) = conn.rpush::<_, _, ()>(&self.queue_key, payload).await {
            // let a redelivery retry the push
            let _: Result<(), _> = conn.del(&marker).await;
            return Err(e.into());
        }
        tracing::debug!(job_id = %job.id, kind = ?job.kind, "Notification job enqueued");
        Ok(true)
    }

    fn mode(&self) -> &'static str {
        "redis"
    }
}

/// Turns events into jobs and enqueues them.
#[derive(Clone)]
pub struct NotificationDispatcher {
    queue: Arc<dyn NotificationQueue>,
    enabled: bool,
}

impl NotificationDispatcher {
    pub fn new(queue: Arc<dyn NotificationQueue>, enabled: bool) -> Self {
        Self { queue, enabled }
    }

    /// Enqueue the notification for `event`. Returns the number of jobs
    /// newly enqueued (duplicates count as zero).
    pub async fn dispatch(&self, event: &DomainEvent) -> Result<usize, NotificationError> {
        if !self.enabled {
            return Ok(0);
        }
        let Some(job) = NotificationJob::from_event(event)? else {
            return Ok(0);
        };

        let enqueued = usize::from(self.queue.enqueue(&job).await?);
        metrics::record_notifications(enqueued);
        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAFE: &str = "0xabcdef0123456789abcdef0123456789abcdef01";

    fn pending() -> DomainEvent {
        DomainEvent::decode(
            format!(
                r#"{{"type":"PENDING_MULTISIG_TRANSACTION","chainId":"1","address":"{}","safeTxHash":"0x{}"}}"#,
                SAFE.to_uppercase().replacen("0X", "0x", 1),
                "ab".repeat(32)
            )
            .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_job_id_is_stable_across_casing() {
        let upper = NotificationJob::from_event(&pending()).unwrap().unwrap();
        let lower_event = DomainEvent::decode(
            format!(
                r#"{{"type":"PENDING_MULTISIG_TRANSACTION","chainId":"1","address":"{SAFE}","safeTxHash":"0x{}"}}"#,
                "ab".repeat(32)
            )
            .as_bytes(),
        )
        .unwrap();
        let lower = NotificationJob::from_event(&lower_event).unwrap().unwrap();

        assert_eq!(upper.id, lower.id);
        assert_eq!(upper.kind, NotificationKind::ConfirmationRequest);
    }

    #[test]
    fn test_events_without_notification() {
        let event = DomainEvent::decode(br#"{"type":"CHAIN_UPDATE","chainId":"1"}"#).unwrap();
        assert!(NotificationJob::from_event(&event).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_jobs_are_dropped() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let dispatcher = NotificationDispatcher::new(queue.clone(), true);

        assert_eq!(dispatcher.dispatch(&pending()).await.unwrap(), 1);
        assert_eq!(dispatcher.dispatch(&pending()).await.unwrap(), 0);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_dispatcher_enqueues_nothing() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let dispatcher = NotificationDispatcher::new(queue.clone(), false);

        assert_eq!(dispatcher.dispatch(&pending()).await.unwrap(), 0);
        assert!(queue.is_empty());
    }
}
