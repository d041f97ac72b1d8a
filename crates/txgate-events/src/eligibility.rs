//! Whether this deployment serves an event's chain.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use txgate_cache::{CacheDirectory, CacheFirstFetcher, NetworkClient};
use txgate_core::ChainId;

#[async_trait]
pub trait ChainEligibility: Send + Sync {
    async fn is_supported(&self, chain_id: &ChainId) -> bool;
}

/// Fixed allow-list. `None` serves every chain.
#[derive(Debug, Clone, Default)]
pub struct StaticChainEligibility {
    chains: Option<HashSet<ChainId>>,
}

impl StaticChainEligibility {
    pub fn all() -> Self {
        Self { chains: None }
    }

    pub fn only(chains: impl IntoIterator<Item = ChainId>) -> Self {
        Self {
            chains: Some(chains.into_iter().collect()),
        }
    }
}

#[async_trait]
impl ChainEligibility for StaticChainEligibility {
    async fn is_supported(&self, chain_id: &ChainId) -> bool {
        self.chains
            .as_ref()
            .is_none_or(|chains| chains.contains(chain_id))
    }
}

/// Asks the config service whether a chain exists, through the cache.
///
/// A chain the service does not know is negatively cached like any other
/// resource. Transient lookup failures count as supported so events are not
/// dropped while the service is unavailable.
pub struct ConfigServiceEligibility {
    fetcher: CacheFirstFetcher,
    directory: Arc<CacheDirectory>,
    network: NetworkClient,
    base_url: String,
}

impl ConfigServiceEligibility {
    pub fn new(
        fetcher: CacheFirstFetcher,
        directory: Arc<CacheDirectory>,
        network: NetworkClient,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            directory,
            network,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn chain_url(&self, chain_id: &ChainId) -> String {
        format!("{}/api/v1/chains/{}", self.base_url, chain_id)
    }
}

#[async_trait]
impl ChainEligibility for ConfigServiceEligibility {
    async fn is_supported(&self, chain_id: &ChainId) -> bool {
        let dir = self.directory.chain(chain_id);
        let network = self.network.clone();
        let url = self.chain_url(chain_id);

        match self
            .fetcher
            .get(&dir, async move { network.get_json(&url).await })
            .await
        {
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => {
                tracing::warn!(chain_id = %chain_id, error = %e, "Chain lookup failed, treating chain as supported");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_allow_list() {
        let only = StaticChainEligibility::only([ChainId::from(1), ChainId::from(137)]);
        assert!(only.is_supported(&ChainId::from(1)).await);
        assert!(!only.is_supported(&ChainId::from(10)).await);

        let all = StaticChainEligibility::all();
        assert!(all.is_supported(&ChainId::from(10)).await);
    }
}
