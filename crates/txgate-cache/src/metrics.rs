//! Counters emitted by the read path.
//!
//! Recording goes through the global `metrics` recorder; when no recorder is
//! installed (tests, embedded use) every call is a no-op.

use metrics::counter;

use crate::directory::ResourceKind;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_NEGATIVE_HITS_TOTAL: &str = "cache_negative_hits_total";
    pub const CACHE_STORE_ERRORS_TOTAL: &str = "cache_store_errors_total";
    pub const CACHE_STALE_WRITES_SKIPPED_TOTAL: &str = "cache_stale_writes_skipped_total";
    pub const DEDUP_JOINED_TOTAL: &str = "dedup_joined_total";
}

pub fn record_hit(kind: ResourceKind) {
    counter!(names::CACHE_HITS_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_negative_hit(kind: ResourceKind) {
    counter!(names::CACHE_NEGATIVE_HITS_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_miss(kind: ResourceKind) {
    counter!(names::CACHE_MISSES_TOTAL, "kind" => kind.as_str()).increment(1);
}

/// A store operation failed and the read path degraded to upstream.
pub fn record_store_error(operation: &'static str) {
    counter!(names::CACHE_STORE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

pub fn record_stale_write_skipped(kind: ResourceKind) {
    counter!(names::CACHE_STALE_WRITES_SKIPPED_TOTAL, "kind" => kind.as_str()).increment(1);
}
