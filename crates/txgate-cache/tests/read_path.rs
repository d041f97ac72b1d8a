//! Behaviour of the cache-first read path against the local store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;
use txgate_cache::{
    CacheDirectory, CacheError, CacheFirstFetcher, CacheService, DataSourceError,
    InvalidationTarget, KeyValueCache, LocalCache, TtlPolicy,
};
use txgate_core::{Address, ChainId};

fn setup() -> (CacheFirstFetcher, LocalCache, CacheDirectory) {
    let local = LocalCache::new();
    let service = CacheService::new(Arc::new(local.clone()), Duration::from_secs(60));
    let directory = CacheDirectory::new(
        "",
        TtlPolicy::new(Duration::from_secs(60), Duration::from_secs(10)),
    );
    (CacheFirstFetcher::new(service), local, directory)
}

fn chain() -> ChainId {
    ChainId::from(1)
}

fn safe() -> Address {
    Address::new("0xabcdef0123456789abcdef0123456789abcdef01").unwrap()
}

fn counting(
    calls: &Arc<AtomicUsize>,
    result: Result<Value, DataSourceError>,
) -> impl std::future::Future<Output = Result<Value, DataSourceError>> + Send + 'static {
    let calls = calls.clone();
    async move {
        calls.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_second_get_is_served_from_cache() {
    let (fetcher, local, directory) = setup();
    let dir = directory.chain(&chain());
    let calls = Arc::new(AtomicUsize::new(0));

    let first = fetcher
        .get(&dir, counting(&calls, Ok(json!({"chainId": "1"}))))
        .await
        .unwrap();
    let second = fetcher
        .get(&dir, counting(&calls, Ok(json!({"chainId": "other"}))))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);
    assert!(local.contains(&dir.address.key, &dir.address.field));
    assert_eq!(fetcher.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_misses_call_upstream_once() {
    let (fetcher, _, directory) = setup();
    let dir = directory.balances(&chain(), &safe(), "USD", true, false);
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = (0..10).map(|_| {
        let calls = calls.clone();
        fetcher.get(&dir, async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(json!({"fiatTotal": "100.0"}))
        })
    });
    let results = futures::future::join_all(requests).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(*result.unwrap(), json!({"fiatTotal": "100.0"}));
    }
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_cached_until_ttl_elapses() {
    let (fetcher, _, directory) = setup();
    let dir = directory.safe(&chain(), &safe());
    let calls = Arc::new(AtomicUsize::new(0));
    let missing = || Err(DataSourceError::not_found("safe"));

    let err = fetcher.get(&dir, counting(&calls, missing())).await.unwrap_err();
    assert!(err.is_not_found());

    let err = fetcher.get(&dir, counting(&calls, missing())).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(dir.ttl.not_found + Duration::from_secs(1)).await;

    let err = fetcher.get(&dir, counting(&calls, missing())).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_transient_failure_is_not_cached() {
    let (fetcher, local, directory) = setup();
    let dir = directory.relay_count(&chain(), &safe());
    let calls = Arc::new(AtomicUsize::new(0));

    let err = fetcher
        .get(&dir, counting(&calls, Err(DataSourceError::from_status(502, "relay"))))
        .await
        .unwrap_err();
    assert_eq!(err, DataSourceError::from_status(502, "relay"));
    assert!(!local.contains(&dir.address.key, &dir.address.field));

    let value = fetcher
        .get(&dir, counting(&calls, Ok(json!({"remaining": 5}))))
        .await
        .unwrap();
    assert_eq!(*value, json!({"remaining": 5}));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalidation_during_fetch_prevents_stale_write() {
    let (fetcher, local, directory) = setup();
    let dir = directory.address_book(&chain(), &safe());
    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let pending = {
        let fetcher = fetcher.clone();
        let dir = dir.clone();
        tokio::spawn(async move {
            fetcher
                .get(&dir, async move {
                    started_tx.send(()).ok();
                    release_rx.await.ok();
                    Ok(json!({"entries": ["stale"]}))
                })
                .await
        })
    };

    started_rx.await.unwrap();
    fetcher
        .cache()
        .invalidate(&InvalidationTarget::key(dir.address.key.clone()))
        .await
        .unwrap();
    release_tx.send(()).unwrap();

    // the caller still receives the fetched value
    let value = pending.await.unwrap().unwrap();
    assert_eq!(*value, json!({"entries": ["stale"]}));
    assert!(!local.contains(&dir.address.key, &dir.address.field));
}

#[tokio::test]
async fn test_get_right_after_invalidation_is_cached() {
    let (fetcher, local, directory) = setup();
    let dir = directory.safe(&chain(), &safe());
    let calls = Arc::new(AtomicUsize::new(0));

    for round in 0..20 {
        fetcher
            .cache()
            .invalidate(&InvalidationTarget::key(dir.address.key.clone()))
            .await
            .unwrap();

        fetcher
            .get(&dir, counting(&calls, Ok(json!({"nonce": round}))))
            .await
            .unwrap();
        assert!(local.contains(&dir.address.key, &dir.address.field));

        let value = fetcher
            .get(&dir, counting(&calls, Ok(json!({"nonce": -1}))))
            .await
            .unwrap();
        assert_eq!(*value, json!({"nonce": round}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 20);
}

/// Local store that counts data writes and can park one generation read
/// until released.
struct RecordingStore {
    inner: LocalCache,
    data_writes: AtomicUsize,
    generation_reads: AtomicUsize,
    pause_on: usize,
    paused: Mutex<Option<oneshot::Sender<()>>>,
    resume: Mutex<Option<oneshot::Receiver<()>>>,
}

impl RecordingStore {
    fn new() -> Self {
        Self {
            inner: LocalCache::new(),
            data_writes: AtomicUsize::new(0),
            generation_reads: AtomicUsize::new(0),
            pause_on: usize::MAX,
            paused: Mutex::new(None),
            resume: Mutex::new(None),
        }
    }

    /// Park the `nth` generation read after it has read the store. Returns
    /// the store, a receiver fired once parked and a sender that resumes it.
    fn pausing_on_generation_read(nth: usize) -> (Self, oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (paused_tx, paused_rx) = oneshot::channel();
        let (resume_tx, resume_rx) = oneshot::channel();
        let store = Self {
            pause_on: nth,
            paused: Mutex::new(Some(paused_tx)),
            resume: Mutex::new(Some(resume_rx)),
            ..Self::new()
        };
        (store, paused_rx, resume_tx)
    }

    fn data_writes(&self) -> usize {
        self.data_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueCache for RecordingStore {
    async fn get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let value = self.inner.get(key, field).await?;
        if key.ends_with("_generation")
            && self.generation_reads.fetch_add(1, Ordering::SeqCst) + 1 == self.pause_on
        {
            if let Some(paused) = self.paused.lock().take() {
                paused.send(()).ok();
            }
            let resume = self.resume.lock().take();
            if let Some(resume) = resume {
                resume.await.ok();
            }
        }
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        field: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.data_writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, field, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn delete_field(&self, key: &str, field: &str) -> Result<(), CacheError> {
        self.inner.delete_field(key, field).await
    }

    async fn incr(&self, key: &str, field: &str, ttl: Duration) -> Result<i64, CacheError> {
        self.inner.incr(key, field, ttl).await
    }

    fn mode(&self) -> &'static str {
        "recording"
    }
}

fn recording_fetcher(store: &Arc<RecordingStore>) -> CacheFirstFetcher {
    let service = CacheService::new(store.clone(), Duration::from_secs(60));
    CacheFirstFetcher::new(service)
}

#[tokio::test]
async fn test_invalidation_between_check_and_write_removes_entry() {
    // reads: before the producer, before the write, after the write
    let (store, paused, resume) = RecordingStore::pausing_on_generation_read(2);
    let store = Arc::new(store);
    let fetcher = recording_fetcher(&store);
    let dir = CacheDirectory::default().safe(&chain(), &safe());

    let pending = {
        let fetcher = fetcher.clone();
        let dir = dir.clone();
        tokio::spawn(async move {
            fetcher
                .get(&dir, async { Ok(json!({"owners": ["stale"]})) })
                .await
        })
    };

    paused.await.unwrap();
    fetcher
        .cache()
        .invalidate(&InvalidationTarget::key(dir.address.key.clone()))
        .await
        .unwrap();
    resume.send(()).unwrap();

    let value = pending.await.unwrap().unwrap();
    assert_eq!(*value, json!({"owners": ["stale"]}));
    assert_eq!(store.data_writes(), 1);
    assert!(!store.inner.contains(&dir.address.key, &dir.address.field));
}

#[tokio::test]
async fn test_concurrent_callers_share_one_transient_error() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = recording_fetcher(&store);
    let dir = CacheDirectory::default().safe(&chain(), &safe());
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = (0..10).map(|_| {
        let calls = calls.clone();
        fetcher.get(&dir, async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(DataSourceError::from_status(503, "safe"))
        })
    });
    let results = futures::future::join_all(requests).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap_err(), DataSourceError::from_status(503, "safe"));
    }
    assert_eq!(store.data_writes(), 0);
    assert!(store.inner.is_empty());
    assert_eq!(fetcher.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_not_found_writes_one_negative_entry() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = recording_fetcher(&store);
    let dir = CacheDirectory::default().safe(&chain(), &safe());
    let calls = Arc::new(AtomicUsize::new(0));

    let requests = (0..10).map(|_| {
        let calls = calls.clone();
        fetcher.get(&dir, async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err(DataSourceError::not_found("safe"))
        })
    });
    let results = futures::future::join_all(requests).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    for result in results {
        assert_eq!(result.unwrap_err(), DataSourceError::not_found("safe"));
    }
    assert_eq!(store.data_writes(), 1);
    assert!(store.inner.contains(&dir.address.key, &dir.address.field));

    // later callers get the negative entry without calling upstream
    let err = fetcher
        .get(&dir, counting(&calls, Ok(json!({"owners": []}))))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

struct BrokenStore;

#[async_trait]
impl KeyValueCache for BrokenStore {
    async fn get(&self, _key: &str, _field: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Command("connection refused".into()))
    }

    async fn set(
        &self,
        _key: &str,
        _field: &str,
        _value: Vec<u8>,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Command("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Command("connection refused".into()))
    }

    async fn delete_field(&self, _key: &str, _field: &str) -> Result<(), CacheError> {
        Err(CacheError::Command("connection refused".into()))
    }

    async fn incr(&self, _key: &str, _field: &str, _ttl: Duration) -> Result<i64, CacheError> {
        Err(CacheError::Command("connection refused".into()))
    }

    fn mode(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn test_store_failures_fall_back_to_upstream() {
    let service = CacheService::new(Arc::new(BrokenStore), Duration::from_secs(60));
    let fetcher = CacheFirstFetcher::new(service);
    let dir = CacheDirectory::default().chain(&chain());
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let value = fetcher
            .get(&dir, counting(&calls, Ok(json!({"chainId": "1"}))))
            .await
            .unwrap();
        assert_eq!(*value, json!({"chainId": "1"}));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[derive(Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ChainInfo {
    chain_id: String,
    chain_name: String,
}

#[tokio::test]
async fn test_get_as_deserializes_payload() {
    let (fetcher, _, directory) = setup();
    let dir = directory.chain(&chain());

    let info: ChainInfo = fetcher
        .get_as(&dir, async { Ok(json!({"chainId": "1", "chainName": "Ethereum"})) })
        .await
        .unwrap();
    assert_eq!(info.chain_name, "Ethereum");

    let err = fetcher
        .get_as::<Vec<u8>, _>(&dir, async { Ok(json!(null)) })
        .await
        .unwrap_err();
    assert!(!err.is_not_found());
}
