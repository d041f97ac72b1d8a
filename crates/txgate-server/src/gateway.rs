//! Composition root: every shared component is built once here and handed
//! out by reference.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use deadpool_redis::Pool;
use tokio::sync::{Mutex, watch};
use txgate_cache::{
    CacheDirectory, CacheFirstFetcher, CacheService, KeyValueCache, LocalCache, NetworkClient,
    RedisCache,
};
use txgate_events::{
    CacheEvictor, ChainEligibility, ChainHousekeeping, ConfigServiceEligibility,
    InMemoryNotificationQueue, InMemoryQueue, InvalidationEventConsumer, MessageQueue,
    NotificationDispatcher, NotificationQueue, RedisNotificationQueue, RedisStreamQueue,
    StaticChainEligibility, StreamConsumerConfig, SubscriptionMultiplexer,
    UnsupportedEventTracker,
};

use crate::config::{AppConfig, ChainsConfig, RedisConfig};
use crate::metrics;

/// Shared store selected at startup, plus the Redis pool when one is usable.
pub struct CacheBackend {
    pub store: Arc<dyn KeyValueCache>,
    pub pool: Option<Pool>,
}

impl CacheBackend {
    pub fn local() -> Self {
        Self {
            store: Arc::new(LocalCache::new()),
            pool: None,
        }
    }

    pub fn redis(pool: Pool) -> Self {
        Self {
            store: Arc::new(RedisCache::new(pool.clone())),
            pool: Some(pool),
        }
    }
}

/// Create the cache backend based on configuration.
///
/// If Redis is enabled and reachable, uses the Redis store. Otherwise falls
/// back to the process-local store.
pub async fn create_cache_backend(config: &RedisConfig) -> CacheBackend {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return CacheBackend::local();
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(config.timeout());
    pool_config.timeouts.create = Some(config.timeout());
    pool_config.timeouts.recycle = Some(config.timeout());
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return CacheBackend::local();
        }
    };

    // Test connection
    match pool.get().await {
        Ok(_) => {
            tracing::info!("✓ Connected to Redis successfully");
            CacheBackend::redis(pool)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to local cache."
            );
            CacheBackend::local()
        }
    }
}

/// Transport and notification queue matching the selected backend.
fn create_queues(
    config: &AppConfig,
    backend: &CacheBackend,
) -> (Arc<dyn MessageQueue>, Arc<dyn NotificationQueue>) {
    match &backend.pool {
        Some(pool) => {
            let stream = StreamConsumerConfig {
                group: config.queue.consumer_group.clone(),
                consumer: config.queue.consumer_name(),
                block: config.queue.block(),
                batch_size: config.queue.batch_size,
            };
            let queue = RedisStreamQueue::new(pool.clone(), config.redis.url.clone(), stream);
            let notifications = RedisNotificationQueue::new(
                pool.clone(),
                config.notifications.queue_key.clone(),
                Duration::from_secs(config.notifications.dedup_ttl_secs),
            );
            (Arc::new(queue), Arc::new(notifications))
        }
        None => {
            tracing::warn!(
                topic = %config.queue.topic,
                "No Redis pool: events only arrive through the in-process queue, which has no external publisher, so cache invalidation is inert"
            );
            (
                Arc::new(InMemoryQueue::new()),
                Arc::new(InMemoryNotificationQueue::new()),
            )
        }
    }
}

fn create_eligibility(
    chains: &ChainsConfig,
    fetcher: &CacheFirstFetcher,
    directory: &Arc<CacheDirectory>,
    network: &NetworkClient,
) -> anyhow::Result<Arc<dyn ChainEligibility>> {
    if let Some(url) = chains.config_service_url() {
        tracing::info!(url = %url, "Chain support resolved through the config service");
        return Ok(Arc::new(ConfigServiceEligibility::new(
            fetcher.clone(),
            directory.clone(),
            network.clone(),
            url,
        )));
    }

    let supported = chains.supported_chains().map_err(anyhow::Error::msg)?;
    if supported.is_empty() {
        tracing::info!("Serving every chain");
        Ok(Arc::new(StaticChainEligibility::all()))
    } else {
        tracing::info!(chains = supported.len(), "Serving a static chain list");
        Ok(Arc::new(StaticChainEligibility::only(supported)))
    }
}

/// The running data-access layer.
pub struct Gateway {
    config: AppConfig,
    cache: CacheService,
    directory: Arc<CacheDirectory>,
    fetcher: CacheFirstFetcher,
    network: NetworkClient,
    multiplexer: Arc<SubscriptionMultiplexer>,
    consumer: Arc<InvalidationEventConsumer>,
    tracker: Arc<UnsupportedEventTracker>,
    queue_mode: &'static str,
    housekeeping_tx: Mutex<Option<watch::Sender<bool>>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl Gateway {
    /// Build every component from configuration, connecting to Redis when
    /// enabled.
    pub async fn build(config: AppConfig) -> anyhow::Result<Self> {
        let backend = create_cache_backend(&config.redis).await;
        let (queue, notifications) = create_queues(&config, &backend);
        Self::build_with(config, backend, queue, notifications)
    }

    /// Build around explicitly supplied transports.
    pub fn build_with(
        config: AppConfig,
        backend: CacheBackend,
        queue: Arc<dyn MessageQueue>,
        notifications: Arc<dyn NotificationQueue>,
    ) -> anyhow::Result<Self> {
        let ttl = config.cache.ttl_policy().map_err(anyhow::Error::msg)?;
        let directory = Arc::new(CacheDirectory::new(config.cache.key_prefix.clone(), ttl));
        let cache = CacheService::new(backend.store, config.cache.marker_ttl());
        let fetcher = CacheFirstFetcher::new(cache.clone());
        let network =
            NetworkClient::new(config.chains.timeout()).context("failed to build upstream client")?;

        let eligibility = create_eligibility(&config.chains, &fetcher, &directory, &network)?;
        let tracker = Arc::new(UnsupportedEventTracker::new());
        let consumer = Arc::new(InvalidationEventConsumer::new(
            eligibility,
            CacheEvictor::new(cache.clone(), directory.clone()),
            NotificationDispatcher::new(notifications, config.notifications.enabled),
            tracker.clone(),
        ));

        let queue_mode = queue.mode();
        let multiplexer = Arc::new(SubscriptionMultiplexer::new(queue));

        tracing::info!(cache = cache.mode(), queue = queue_mode, "Gateway components built");

        Ok(Self {
            config,
            cache,
            directory,
            fetcher,
            network,
            multiplexer,
            consumer,
            tracker,
            queue_mode,
            housekeeping_tx: Mutex::new(None),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Subscribe the invalidation consumer and start housekeeping.
    /// Later calls are no-ops.
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let topic = &self.config.queue.topic;
        self.multiplexer
            .subscribe(topic, self.consumer.clone())
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;

        let housekeeping = ChainHousekeeping::new(
            self.tracker.clone(),
            self.cache.clone(),
            self.directory.clone(),
            self.config.housekeeping.interval(),
        );
        *self.housekeeping_tx.lock().await = Some(housekeeping.start());

        metrics::record_gateway_start(self.cache.mode(), self.queue_mode);
        metrics::set_subscriptions(self.multiplexer.topics().await.len());
        tracing::info!(topic = %topic, "Gateway started");
        Ok(())
    }

    /// Stop housekeeping and close every subscription. Runs once.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(tx) = self.housekeeping_tx.lock().await.take() {
            let _ = tx.send(true);
        }
        self.multiplexer
            .shutdown()
            .await
            .context("failed to close subscriptions")?;
        metrics::set_subscriptions(0);
        tracing::info!("Gateway stopped");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn directory(&self) -> &Arc<CacheDirectory> {
        &self.directory
    }

    /// Cache-first read path for data sources.
    pub fn fetcher(&self) -> &CacheFirstFetcher {
        &self.fetcher
    }

    pub fn network(&self) -> &NetworkClient {
        &self.network
    }

    pub fn multiplexer(&self) -> &Arc<SubscriptionMultiplexer> {
        &self.multiplexer
    }

    pub fn consumer(&self) -> &Arc<InvalidationEventConsumer> {
        &self.consumer
    }

    pub fn unsupported_events(&self) -> &Arc<UnsupportedEventTracker> {
        &self.tracker
    }

    pub fn cache_mode(&self) -> &'static str {
        self.cache.mode()
    }

    pub fn queue_mode(&self) -> &'static str {
        self.queue_mode
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.stopped.load(Ordering::SeqCst)
    }
}
