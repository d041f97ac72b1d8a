//! Slow path for events on chains this deployment does not serve.
//!
//! Such events are acknowledged immediately and only recorded here. A
//! periodic task later evicts the cached config of every recorded chain and
//! the chains list, so a chain added to the config service becomes eligible
//! without waiting for its not-found entry to expire.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};
use txgate_cache::{CacheDirectory, CacheService, InvalidationTarget, ResourceKind};
use txgate_core::{ChainId, EventType};

use crate::metrics;

/// Chains that delivered events while unsupported, with event counts.
#[derive(Debug, Default)]
pub struct UnsupportedEventTracker {
    chains: Mutex<BTreeMap<ChainId, u64>>,
}

impl UnsupportedEventTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, chain_id: &ChainId, event_type: EventType) {
        *self.chains.lock().entry(chain_id.clone()).or_insert(0) += 1;
        metrics::record_unsupported(event_type);
        debug!(chain_id = %chain_id, event = %event_type, "Recorded event for unsupported chain");
    }

    /// Take every recorded chain, leaving the tracker empty.
    pub fn drain(&self) -> Vec<(ChainId, u64)> {
        std::mem::take(&mut *self.chains.lock()).into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.chains.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodic eviction of chain config for recorded unsupported chains.
pub struct ChainHousekeeping {
    tracker: Arc<UnsupportedEventTracker>,
    cache: CacheService,
    directory: Arc<CacheDirectory>,
    interval: Duration,
}

impl ChainHousekeeping {
    pub fn new(
        tracker: Arc<UnsupportedEventTracker>,
        cache: CacheService,
        directory: Arc<CacheDirectory>,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            cache,
            directory,
            interval,
        }
    }

    /// Process everything recorded so far. Returns the number of chains
    /// whose config was evicted.
    pub async fn run_once(&self) -> usize {
        let swept = self.cache.store().cleanup_expired();
        if swept > 0 {
            debug!(swept, "Dropped expired local cache entries");
        }

        let drained = self.tracker.drain();
        if drained.is_empty() {
            return 0;
        }

        let mut evicted = 0;
        for (chain_id, events) in &drained {
            let target = InvalidationTarget::key(self.directory.chain_key(ResourceKind::Chain, chain_id));
            match self.cache.invalidate(&target).await {
                Ok(()) => {
                    evicted += 1;
                    info!(chain_id = %chain_id, events, "Evicted config of unsupported chain");
                }
                Err(e) => warn!(chain_id = %chain_id, error = %e, "Failed to evict chain config"),
            }
        }

        let chains = InvalidationTarget::key(self.directory.global_key(ResourceKind::Chains));
        if let Err(e) = self.cache.invalidate(&chains).await {
            warn!(error = %e, "Failed to evict chains list");
        }
        evicted
    }

    /// Start the task in the background.
    ///
    /// Returns a shutdown sender; sending `true` stops the task.
    pub fn start(self) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "Chain housekeeping started");
            // first pass one interval after start; nothing is recorded yet
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("Chain housekeeping shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}
