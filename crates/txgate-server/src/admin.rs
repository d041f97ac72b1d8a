//! Admin HTTP surface: liveness and Prometheus scrape endpoint.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use crate::gateway::Gateway;
use crate::metrics::render_metrics;

pub fn admin_router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(gateway)
}

async fn health(State(gateway): State<Arc<Gateway>>) -> Response {
    let topics = gateway.multiplexer().topics().await;
    let status = if gateway.is_running() { "ok" } else { "stopped" };
    let code = if gateway.is_running() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": status,
        "cache": gateway.cache_mode(),
        "queue": gateway.queue_mode(),
        "subscriptions": topics,
        "in_flight": gateway.fetcher().in_flight(),
        "unsupported_chains_pending": gateway.unsupported_events().len(),
    });
    (code, Json(body)).into_response()
}

async fn metrics_handler() -> Response {
    match render_metrics() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Serve the admin surface until `shutdown` resolves.
pub async fn serve(
    gateway: Arc<Gateway>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = gateway.config().addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("admin surface listening on {}", addr);
    axum::serve(listener, admin_router(gateway))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

pub async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
