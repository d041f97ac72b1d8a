//! Prometheus exporter for the counters recorded by the library crates.
//!
//! `txgate-cache` and `txgate-events` record through the `metrics` facade;
//! their counters are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub mod names {
    pub const GATEWAY_STARTS_TOTAL: &str = "gateway_starts_total";
    pub const GATEWAY_SUBSCRIPTIONS: &str = "gateway_subscriptions";
}

/// Install the Prometheus recorder. Returns false when already installed or
/// when another recorder owns the process.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics renders the handle on demand
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render the current metrics in Prometheus text format.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

pub fn record_gateway_start(cache_mode: &'static str, queue_mode: &'static str) {
    ::metrics::counter!(names::GATEWAY_STARTS_TOTAL, "cache" => cache_mode, "queue" => queue_mode)
        .increment(1);
}

pub fn set_subscriptions(count: usize) {
    ::metrics::gauge!(names::GATEWAY_SUBSCRIPTIONS).set(count as f64);
}
