//! Event → cache eviction routing.
//!
//! [`evicted_kinds`] is the single table of which resource families each
//! event type invalidates. [`eviction_targets`] resolves those families to
//! concrete keys using the event's identifiers.
//!
//! | Event                           | Evicted families |
//! |---------------------------------|------------------|
//! | `CHAIN_UPDATE`                  | chain, chains |
//! | `SAFE_APPS_UPDATE`              | safe apps |
//! | `PENDING/DELETED_MULTISIG_TX`   | safe, multisig txs, queued, the tx |
//! | `EXECUTED_MULTISIG_TRANSACTION` | safe, balances, collectibles, multisig txs, queued, history, transfers, the tx |
//! | `NEW_CONFIRMATION`              | multisig txs, queued, the tx |
//! | `MODULE_TRANSACTION`            | safe, balances, collectibles, module txs, history, transfers |
//! | `INCOMING/OUTGOING_ETHER`       | balances, history, transfers (+ incoming transfers) |
//! | `INCOMING/OUTGOING_TOKEN`       | balances, collectibles, history, transfers (+ incoming transfers) |
//! | `MESSAGE_CREATED`, `NEW_MESSAGE_CONFIRMATION` | messages, the message |
//! | `SAFE_CREATED`                  | safe, safe exists |
//! | `*_DELEGATE`                    | delegates (whole chain) |
//! | `REORG_DETECTED`                | nothing; entries age out by TTL |
//!
//! Address books are never evicted by transaction events.

use std::sync::Arc;

use txgate_cache::{CacheDirectory, CacheService, InvalidationTarget, ResourceKind};
use txgate_core::{DomainEvent, EventType};

use crate::error::EvictionError;
use crate::metrics;

use txgate_cache::ResourceKind as K;

/// Resource families invalidated by an event type.
pub fn evicted_kinds(event_type: EventType) -> &'static [ResourceKind] {
    match event_type {
        EventType::ChainUpdate => &[K::Chain, K::Chains],
        EventType::SafeAppsUpdate => &[K::SafeApps],
        EventType::PendingMultisigTransaction | EventType::DeletedMultisigTransaction => &[
            K::Safe,
            K::MultisigTransactions,
            K::QueuedTransactions,
            K::MultisigTransaction,
        ],
        EventType::ExecutedMultisigTransaction => &[
            K::Safe,
            K::Balances,
            K::Collectibles,
            K::MultisigTransactions,
            K::QueuedTransactions,
            K::TransactionHistory,
            K::Transfers,
            K::MultisigTransaction,
        ],
        EventType::NewConfirmation => &[
            K::MultisigTransactions,
            K::QueuedTransactions,
            K::MultisigTransaction,
        ],
        EventType::ModuleTransaction => &[
            K::Safe,
            K::Balances,
            K::Collectibles,
            K::ModuleTransactions,
            K::TransactionHistory,
            K::Transfers,
        ],
        EventType::IncomingEther => &[
            K::Balances,
            K::TransactionHistory,
            K::Transfers,
            K::IncomingTransfers,
        ],
        EventType::OutgoingEther => &[K::Balances, K::TransactionHistory, K::Transfers],
        EventType::IncomingToken => &[
            K::Balances,
            K::Collectibles,
            K::TransactionHistory,
            K::Transfers,
            K::IncomingTransfers,
        ],
        EventType::OutgoingToken => &[
            K::Balances,
            K::Collectibles,
            K::TransactionHistory,
            K::Transfers,
        ],
        EventType::MessageCreated | EventType::NewMessageConfirmation => {
            &[K::Messages, K::Message]
        }
        EventType::SafeCreated => &[K::Safe, K::SafeExists],
        EventType::NewDelegate | EventType::UpdatedDelegate | EventType::DeletedDelegate => {
            &[K::Delegates]
        }
        EventType::ReorgDetected => &[],
    }
}

/// Concrete keys to delete for `event`.
pub fn eviction_targets(directory: &CacheDirectory, event: &DomainEvent) -> Vec<InvalidationTarget> {
    let chain_id = event.chain_id();
    evicted_kinds(event.event_type())
        .iter()
        .filter_map(|&kind| {
            let key = match kind {
                K::Chains | K::FiatCodes => directory.global_key(kind),
                K::Chain | K::SafeApps | K::Delegates => directory.chain_key(kind, chain_id),
                K::MultisigTransaction => {
                    directory.subject_key(kind, chain_id, safe_tx_hash(event)?)
                }
                K::Message => directory.subject_key(kind, chain_id, message_hash(event)?),
                _ => directory.subject_key(kind, chain_id, event.safe_address()?.as_str()),
            };
            Some(InvalidationTarget::key(key))
        })
        .collect()
}

fn safe_tx_hash(event: &DomainEvent) -> Option<&str> {
    match event {
        DomainEvent::PendingMultisigTransaction { safe_tx_hash, .. }
        | DomainEvent::DeletedMultisigTransaction { safe_tx_hash, .. }
        | DomainEvent::ExecutedMultisigTransaction { safe_tx_hash, .. }
        | DomainEvent::NewConfirmation { safe_tx_hash, .. } => Some(safe_tx_hash.as_str()),
        _ => None,
    }
}

fn message_hash(event: &DomainEvent) -> Option<&str> {
    match event {
        DomainEvent::MessageCreated { message_hash, .. }
        | DomainEvent::NewMessageConfirmation { message_hash, .. } => Some(message_hash.as_str()),
        _ => None,
    }
}

/// Deletes the cache entries an event makes stale.
#[derive(Clone)]
pub struct CacheEvictor {
    cache: CacheService,
    directory: Arc<CacheDirectory>,
}

impl CacheEvictor {
    pub fn new(cache: CacheService, directory: Arc<CacheDirectory>) -> Self {
        Self { cache, directory }
    }

    /// Invalidate every target for `event` concurrently.
    ///
    /// All deletions are attempted even when some fail. Deleting absent keys
    /// succeeds, so redelivered events are harmless. Returns the number of
    /// targets evicted.
    pub async fn evict(&self, event: &DomainEvent) -> Result<usize, EvictionError> {
        let targets = eviction_targets(&self.directory, event);
        let total = targets.len();

        let results = futures::future::join_all(
            targets.iter().map(|target| self.cache.invalidate(target)),
        )
        .await;

        let mut failed = 0;
        let mut first = None;
        for (target, result) in targets.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(target = %target, error = %e, "Cache eviction failed");
                failed += 1;
                first.get_or_insert(e);
            }
        }

        metrics::record_evictions(event.event_type(), total - failed);

        match first {
            None => Ok(total),
            Some(first) => Err(EvictionError {
                failed,
                total,
                first,
            }),
        }
    }
}
