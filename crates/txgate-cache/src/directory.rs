//! Deterministic mapping from logical resources to cache addresses.
//!
//! ## Key Format
//!
//! `{prefix}{chainId}_{kind}_{subject}` with field `{variant}`, e.g.
//! `1_balances_0xabc…` / `USD_true_false`. Chain-less resources drop the
//! chain segment (`chains`, `fiat_codes`).
//!
//! Keys name a resource family and are what invalidation targets; fields
//! select a variant (currency, pagination, filters). Every function here is
//! pure: the same identifiers always produce the same address.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use txgate_core::{Address, ChainId, TxHash};

/// A resource family the gateway caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Chains,
    Chain,
    SafeApps,
    Safe,
    SafeExists,
    Balances,
    Collectibles,
    MultisigTransactions,
    MultisigTransaction,
    QueuedTransactions,
    TransactionHistory,
    ModuleTransactions,
    Transfers,
    IncomingTransfers,
    Messages,
    Message,
    Delegates,
    RelayCount,
    AddressBook,
    Contract,
    Token,
    FiatCodes,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Chains => "chains",
            ResourceKind::Chain => "chain",
            ResourceKind::SafeApps => "safe_apps",
            ResourceKind::Safe => "safe",
            ResourceKind::SafeExists => "safe_exists",
            ResourceKind::Balances => "balances",
            ResourceKind::Collectibles => "collectibles",
            ResourceKind::MultisigTransactions => "multisig_transactions",
            ResourceKind::MultisigTransaction => "multisig_transaction",
            ResourceKind::QueuedTransactions => "queued_transactions",
            ResourceKind::TransactionHistory => "transaction_history",
            ResourceKind::ModuleTransactions => "module_transactions",
            ResourceKind::Transfers => "transfers",
            ResourceKind::IncomingTransfers => "incoming_transfers",
            ResourceKind::Messages => "messages",
            ResourceKind::Message => "message",
            ResourceKind::Delegates => "delegates",
            ResourceKind::RelayCount => "relay_count",
            ResourceKind::AddressBook => "address_book",
            ResourceKind::Contract => "contract",
            ResourceKind::Token => "token",
            ResourceKind::FiatCodes => "fiat_codes",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured cache address: `key` names the family, `field` the variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheAddress {
    pub key: String,
    pub field: String,
}

impl CacheAddress {
    pub fn new(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: field.into(),
        }
    }

    /// Identity used by the in-flight registry.
    pub fn dedup_key(&self) -> String {
        format!("{}#{}", self.key, self.field)
    }
}

impl fmt::Display for CacheAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.field)
    }
}

/// TTLs applied after a fetch: `fresh` on success, `not_found` on a
/// confirmed absence. `not_found` never exceeds `fresh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub fresh: Duration,
    pub not_found: Duration,
}

impl CacheTtl {
    pub fn new(fresh: Duration, not_found: Duration) -> Self {
        Self {
            fresh,
            not_found: not_found.min(fresh),
        }
    }
}

/// Everything the read path needs to cache one resource variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDir {
    pub kind: ResourceKind,
    pub address: CacheAddress,
    pub ttl: CacheTtl,
}

/// What an eviction removes: a whole family or a single variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidationTarget {
    pub key: String,
    pub field: Option<String>,
}

impl InvalidationTarget {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            field: None,
        }
    }

    pub fn field(address: CacheAddress) -> Self {
        Self {
            key: address.key,
            field: Some(address.field),
        }
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}#{}", self.key, field),
            None => f.write_str(&self.key),
        }
    }
}

/// Pagination parameters that select a variant of a list resource.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Pagination {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    fn field(&self) -> String {
        format!("{}_{}", opt(self.limit.as_ref()), opt(self.offset.as_ref()))
    }
}

fn opt<T: fmt::Display>(value: Option<&T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Default TTLs plus per-kind overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    pub default: Duration,
    pub not_found: Duration,
    pub overrides: HashMap<ResourceKind, Duration>,
    pub not_found_overrides: HashMap<ResourceKind, Duration>,
}

impl TtlPolicy {
    pub fn new(default: Duration, not_found: Duration) -> Self {
        Self {
            default,
            not_found,
            overrides: HashMap::new(),
            not_found_overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, kind: ResourceKind, ttl: Duration) -> Self {
        self.overrides.insert(kind, ttl);
        self
    }

    pub fn with_not_found_override(mut self, kind: ResourceKind, ttl: Duration) -> Self {
        self.not_found_overrides.insert(kind, ttl);
        self
    }

    pub fn ttl_for(&self, kind: ResourceKind) -> CacheTtl {
        let fresh = self.overrides.get(&kind).copied().unwrap_or(self.default);
        let not_found = self
            .not_found_overrides
            .get(&kind)
            .copied()
            .unwrap_or(self.not_found);
        CacheTtl::new(fresh, not_found)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(30))
    }
}

/// Namespace of pure resource → address mappings.
///
/// Holds only immutable deployment settings (key prefix, TTL policy); it is
/// built once at startup and shared.
#[derive(Debug, Clone, Default)]
pub struct CacheDirectory {
    prefix: String,
    ttl: TtlPolicy,
}

impl CacheDirectory {
    pub fn new(prefix: impl Into<String>, ttl: TtlPolicy) -> Self {
        Self {
            prefix: prefix.into(),
            ttl,
        }
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    // ------------------------------------------------------------------
    // Family keys
    // ------------------------------------------------------------------

    /// Key of a family that is not scoped to a chain.
    pub fn global_key(&self, kind: ResourceKind) -> String {
        format!("{}{}", self.prefix, kind)
    }

    /// Key of a family scoped to a whole chain.
    pub fn chain_key(&self, kind: ResourceKind, chain_id: &ChainId) -> String {
        format!("{}{}_{}", self.prefix, chain_id, kind)
    }

    /// Key of a family scoped to one subject (address or hash) on a chain.
    pub fn subject_key(&self, kind: ResourceKind, chain_id: &ChainId, subject: &str) -> String {
        format!("{}{}_{}_{}", self.prefix, chain_id, kind, subject)
    }

    fn dir(&self, kind: ResourceKind, key: String, field: impl Into<String>) -> CacheDir {
        CacheDir {
            kind,
            address: CacheAddress::new(key, field),
            ttl: self.ttl.ttl_for(kind),
        }
    }

    // ------------------------------------------------------------------
    // Chain configuration
    // ------------------------------------------------------------------

    pub fn chains(&self, page: Pagination) -> CacheDir {
        self.dir(ResourceKind::Chains, self.global_key(ResourceKind::Chains), page.field())
    }

    pub fn chain(&self, chain_id: &ChainId) -> CacheDir {
        self.dir(
            ResourceKind::Chain,
            self.chain_key(ResourceKind::Chain, chain_id),
            "",
        )
    }

    pub fn safe_apps(&self, chain_id: &ChainId, url: Option<&str>) -> CacheDir {
        self.dir(
            ResourceKind::SafeApps,
            self.chain_key(ResourceKind::SafeApps, chain_id),
            url.unwrap_or_default(),
        )
    }

    pub fn fiat_codes(&self) -> CacheDir {
        self.dir(
            ResourceKind::FiatCodes,
            self.global_key(ResourceKind::FiatCodes),
            "",
        )
    }

    // ------------------------------------------------------------------
    // Safe state
    // ------------------------------------------------------------------

    pub fn safe(&self, chain_id: &ChainId, safe: &Address) -> CacheDir {
        self.safe_scoped(ResourceKind::Safe, chain_id, safe, String::new())
    }

    pub fn safe_exists(&self, chain_id: &ChainId, safe: &Address) -> CacheDir {
        self.safe_scoped(ResourceKind::SafeExists, chain_id, safe, String::new())
    }

    pub fn balances(
        &self,
        chain_id: &ChainId,
        safe: &Address,
        fiat_code: &str,
        trusted: bool,
        exclude_spam: bool,
    ) -> CacheDir {
        let field = format!(
            "{}_{}_{}",
            fiat_code.to_ascii_uppercase(),
            trusted,
            exclude_spam
        );
        self.safe_scoped(ResourceKind::Balances, chain_id, safe, field)
    }

    pub fn collectibles(
        &self,
        chain_id: &ChainId,
        safe: &Address,
        page: Pagination,
        trusted: bool,
        exclude_spam: bool,
    ) -> CacheDir {
        let field = format!("{}_{}_{}", page.field(), trusted, exclude_spam);
        self.safe_scoped(ResourceKind::Collectibles, chain_id, safe, field)
    }

    pub fn address_book(&self, chain_id: &ChainId, safe: &Address) -> CacheDir {
        self.safe_scoped(ResourceKind::AddressBook, chain_id, safe, String::new())
    }

    pub fn relay_count(&self, chain_id: &ChainId, address: &Address) -> CacheDir {
        self.safe_scoped(ResourceKind::RelayCount, chain_id, address, String::new())
    }

    pub fn delegates(
        &self,
        chain_id: &ChainId,
        safe: Option<&Address>,
        delegate: Option<&Address>,
        delegator: Option<&Address>,
        page: Pagination,
    ) -> CacheDir {
        let field = format!(
            "{}_{}_{}_{}",
            opt(safe),
            opt(delegate),
            opt(delegator),
            page.field()
        );
        self.dir(
            ResourceKind::Delegates,
            self.chain_key(ResourceKind::Delegates, chain_id),
            field,
        )
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub fn multisig_transactions(
        &self,
        chain_id: &ChainId,
        safe: &Address,
        executed: Option<bool>,
        page: Pagination,
    ) -> CacheDir {
        let field = format!("{}_{}", opt(executed.as_ref()), page.field());
        self.safe_scoped(ResourceKind::MultisigTransactions, chain_id, safe, field)
    }

    pub fn multisig_transaction(&self, chain_id: &ChainId, safe_tx_hash: &TxHash) -> CacheDir {
        self.dir(
            ResourceKind::MultisigTransaction,
            self.subject_key(ResourceKind::MultisigTransaction, chain_id, safe_tx_hash.as_str()),
            "",
        )
    }

    pub fn queued_transactions(
        &self,
        chain_id: &ChainId,
        safe: &Address,
        page: Pagination,
    ) -> CacheDir {
        self.safe_scoped(ResourceKind::QueuedTransactions, chain_id, safe, page.field())
    }

    pub fn transaction_history(
        &self,
        chain_id: &ChainId,
        safe: &Address,
        page: Pagination,
    ) -> CacheDir {
        self.safe_scoped(ResourceKind::TransactionHistory, chain_id, safe, page.field())
    }

    pub fn module_transactions(
        &self,
        chain_id: &ChainId,
        safe: &Address,
        page: Pagination,
    ) -> CacheDir {
        self.safe_scoped(ResourceKind::ModuleTransactions, chain_id, safe, page.field())
    }

    pub fn transfers(&self, chain_id: &ChainId, safe: &Address, page: Pagination) -> CacheDir {
        self.safe_scoped(ResourceKind::Transfers, chain_id, safe, page.field())
    }

    pub fn incoming_transfers(
        &self,
        chain_id: &ChainId,
        safe: &Address,
        page: Pagination,
    ) -> CacheDir {
        self.safe_scoped(ResourceKind::IncomingTransfers, chain_id, safe, page.field())
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub fn messages(&self, chain_id: &ChainId, safe: &Address, page: Pagination) -> CacheDir {
        self.safe_scoped(ResourceKind::Messages, chain_id, safe, page.field())
    }

    pub fn message(&self, chain_id: &ChainId, message_hash: &TxHash) -> CacheDir {
        self.dir(
            ResourceKind::Message,
            self.subject_key(ResourceKind::Message, chain_id, message_hash.as_str()),
            "",
        )
    }

    // ------------------------------------------------------------------
    // Contracts and tokens
    // ------------------------------------------------------------------

    pub fn contract(&self, chain_id: &ChainId, address: &Address) -> CacheDir {
        self.safe_scoped(ResourceKind::Contract, chain_id, address, String::new())
    }

    pub fn token(&self, chain_id: &ChainId, address: &Address) -> CacheDir {
        self.safe_scoped(ResourceKind::Token, chain_id, address, String::new())
    }

    fn safe_scoped(
        &self,
        kind: ResourceKind,
        chain_id: &ChainId,
        address: &Address,
        field: String,
    ) -> CacheDir {
        self.dir(kind, self.subject_key(kind, chain_id, address.as_str()), field)
    }
}
