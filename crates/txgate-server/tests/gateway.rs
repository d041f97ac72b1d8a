use std::sync::Arc;

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use txgate_cache::{LocalCache, Pagination};
use txgate_core::{Address, ChainId};
use txgate_events::{InMemoryNotificationQueue, InMemoryQueue};
use txgate_server::{AppConfig, CacheBackend, Gateway, admin_router};

const SAFE: &str = "0x1111111111111111111111111111111111111111";

struct Fixture {
    gateway: Arc<Gateway>,
    local: LocalCache,
    queue: Arc<InMemoryQueue>,
    jobs: Arc<InMemoryNotificationQueue>,
}

fn fixture(config: AppConfig) -> Fixture {
    let local = LocalCache::new();
    let backend = CacheBackend {
        store: Arc::new(local.clone()),
        pool: None,
    };
    let queue = Arc::new(InMemoryQueue::new());
    let jobs = Arc::new(InMemoryNotificationQueue::new());
    let gateway = Gateway::build_with(config, backend, queue.clone(), jobs.clone()).expect("build gateway");
    Fixture {
        gateway: Arc::new(gateway),
        local,
        queue,
        jobs,
    }
}

fn executed_event(chain_id: &str) -> Vec<u8> {
    format!(
        r#"{{"type":"EXECUTED_MULTISIG_TRANSACTION","chainId":"{chain_id}","address":"{SAFE}","safeTxHash":"0x{}"}}"#,
        "ab".repeat(32)
    )
    .into_bytes()
}

async fn start_admin(gateway: Arc<Gateway>) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = admin_router(gateway);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

#[tokio::test]
async fn published_event_evicts_cache_and_enqueues_notification() {
    let fx = fixture(AppConfig::default());
    fx.gateway.start().await.expect("start");

    let topic = fx.gateway.config().queue.topic.clone();
    assert_eq!(fx.queue.subscription_count(&topic), 1);

    let chain = ChainId::from(1);
    let safe = Address::new(SAFE).unwrap();
    let queued = fx
        .gateway
        .directory()
        .queued_transactions(&chain, &safe, Pagination::new(20, 0));
    fx.gateway
        .fetcher()
        .get(&queued, async { Ok(json!({"results": []})) })
        .await
        .unwrap();
    assert!(fx.local.contains(&queued.address.key, &queued.address.field));

    fx.queue.publish(&topic, &executed_event("1")).await.unwrap();

    assert!(!fx.local.contains(&queued.address.key, &queued.address.field));
    assert_eq!(fx.jobs.len(), 1);

    fx.gateway.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn unsupported_chain_events_are_tracked_not_processed() {
    let mut config = AppConfig::default();
    config.chains.supported = vec!["1".into()];
    let fx = fixture(config);
    fx.gateway.start().await.expect("start");

    let topic = fx.gateway.config().queue.topic.clone();
    fx.queue.publish(&topic, &executed_event("5")).await.unwrap();

    assert_eq!(fx.gateway.unsupported_events().len(), 1);
    assert!(fx.jobs.is_empty());

    fx.gateway.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn start_and_shutdown_are_idempotent() {
    let fx = fixture(AppConfig::default());
    fx.gateway.start().await.unwrap();
    fx.gateway.start().await.unwrap();
    assert_eq!(fx.queue.subscribe_calls(), 1);

    fx.gateway.shutdown().await.unwrap();
    fx.gateway.shutdown().await.unwrap();
    assert!(fx.queue.is_closed());
    assert!(!fx.gateway.is_running());
}

#[tokio::test]
async fn health_reports_modes_and_lifecycle() {
    let fx = fixture(AppConfig::default());
    fx.gateway.start().await.unwrap();
    let (base, shutdown_tx, handle) = start_admin(fx.gateway.clone()).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["cache"], "local");
    assert_eq!(body["queue"], "memory");
    assert_eq!(body["subscriptions"], json!(["txgate:events"]));

    fx.gateway.shutdown().await.unwrap();

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "stopped");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
