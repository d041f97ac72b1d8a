//! Counters emitted by the invalidation pipeline.

use metrics::counter;
use txgate_core::EventType;

/// Metric names as constants for consistency.
pub mod names {
    pub const EVENTS_TOTAL: &str = "events_total";
    pub const EVICTIONS_TOTAL: &str = "evictions_total";
    pub const NOTIFICATIONS_ENQUEUED_TOTAL: &str = "notifications_enqueued_total";
    pub const UNSUPPORTED_EVENTS_TOTAL: &str = "unsupported_events_total";
}

/// Record how a delivered message ended (`rejected`, `ignored`, `processed`).
pub fn record_event(outcome: &'static str) {
    counter!(names::EVENTS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_evictions(event_type: EventType, count: usize) {
    counter!(names::EVICTIONS_TOTAL, "event" => event_type.as_str()).increment(count as u64);
}

pub fn record_notifications(count: usize) {
    counter!(names::NOTIFICATIONS_ENQUEUED_TOTAL).increment(count as u64);
}

pub fn record_unsupported(event_type: EventType) {
    counter!(names::UNSUPPORTED_EVENTS_TOTAL, "event" => event_type.as_str()).increment(1);
}
