//! Translates delivered domain events into cache evictions and notifications.
//!
//! Per message: decode, check chain eligibility, then run the eviction and
//! notification pipelines concurrently and wait for both. Every path ends
//! with the message acknowledged:
//!
//! - undecodable payloads are rejected permanently (retrying cannot fix them)
//! - events on unsupported chains are recorded for housekeeping
//! - pipeline failures are logged individually and never fail the message
//!
//! Delivery is at-least-once, so both pipelines are idempotent.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use txgate_core::{ChainId, DomainEvent, EventType};

use crate::error::{EvictionError, HandlerError, NotificationError};
use crate::eligibility::ChainEligibility;
use crate::eviction::CacheEvictor;
use crate::housekeeping::UnsupportedEventTracker;
use crate::metrics;
use crate::notifications::NotificationDispatcher;
use crate::queue::MessageHandler;
use crate::settle::{Outcome, op, settle_all};

/// Terminal state of one delivered message.
#[derive(Debug)]
pub enum MessageOutcome {
    /// The payload was not a valid event; acknowledged without retry.
    Rejected { reason: String },
    /// The event's chain is not served; recorded for housekeeping.
    Ignored {
        event_type: EventType,
        chain_id: ChainId,
    },
    /// Both pipelines settled.
    Processed(ProcessReport),
}

#[derive(Debug)]
pub struct ProcessReport {
    pub event_type: EventType,
    pub eviction: PipelineStatus,
    pub notification: PipelineStatus,
}

/// Result of one side-effect pipeline, with the count of effects applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    Succeeded(usize),
    Failed(String),
}

impl PipelineStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineStatus::Succeeded(_))
    }
}

#[derive(Debug)]
enum PipelineError {
    Eviction(EvictionError),
    Notification(NotificationError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Eviction(e) => write!(f, "eviction: {e}"),
            PipelineError::Notification(e) => write!(f, "notification: {e}"),
        }
    }
}

pub struct InvalidationEventConsumer {
    eligibility: Arc<dyn ChainEligibility>,
    evictor: CacheEvictor,
    notifications: NotificationDispatcher,
    tracker: Arc<UnsupportedEventTracker>,
}

impl InvalidationEventConsumer {
    pub fn new(
        eligibility: Arc<dyn ChainEligibility>,
        evictor: CacheEvictor,
        notifications: NotificationDispatcher,
        tracker: Arc<UnsupportedEventTracker>,
    ) -> Self {
        Self {
            eligibility,
            evictor,
            notifications,
            tracker,
        }
    }

    /// Drive one message to its terminal state.
    pub async fn process(&self, payload: &[u8]) -> MessageOutcome {
        let event = match DomainEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, payload = %String::from_utf8_lossy(payload), "Rejecting malformed event");
                metrics::record_event("rejected");
                return MessageOutcome::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let event_type = event.event_type();
        let chain_id = event.chain_id();

        if !self.eligibility.is_supported(chain_id).await {
            self.tracker.record(chain_id, event_type);
            metrics::record_event("ignored");
            return MessageOutcome::Ignored {
                event_type,
                chain_id: chain_id.clone(),
            };
        }

        let settled = settle_all(vec![
            op("eviction", async {
                self.evictor
                    .evict(&event)
                    .await
                    .map_err(PipelineError::Eviction)
            }),
            op("notification", async {
                self.notifications
                    .dispatch(&event)
                    .await
                    .map_err(PipelineError::Notification)
            }),
        ])
        .await;

        let mut statuses = settled.into_iter().map(|s| match s.outcome {
            Outcome::Ok(count) => PipelineStatus::Succeeded(count),
            Outcome::Err(e) => PipelineStatus::Failed(e.to_string()),
            Outcome::Panicked(msg) => PipelineStatus::Failed(format!("panicked: {msg}")),
        });
        let missing = || PipelineStatus::Failed("not run".to_string());
        let report = ProcessReport {
            event_type,
            eviction: statuses.next().unwrap_or_else(missing),
            notification: statuses.next().unwrap_or_else(missing),
        };

        tracing::info!(
            event = %event_type,
            chain_id = %chain_id,
            eviction = ?report.eviction,
            notification = ?report.notification,
            "Event processed"
        );
        metrics::record_event("processed");
        MessageOutcome::Processed(report)
    }
}

#[async_trait]
impl MessageHandler for InvalidationEventConsumer {
    fn name(&self) -> &str {
        "invalidation-consumer"
    }

    async fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self.process(payload).await;
        Ok(())
    }
}
