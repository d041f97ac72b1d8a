use serde::{Deserialize, Serialize};
use std::{collections::HashMap, net::SocketAddr, time::Duration};
use txgate_cache::{ResourceKind, TtlPolicy};
use txgate_core::ChainId;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Redis configuration (shared cache, event stream, notification queue)
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Invalidation event stream
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub chains: ChainsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub housekeeping: HousekeepingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Redis validation
        if self.redis.enabled && self.redis.url.trim().is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        if self.redis.pool_size == 0 {
            return Err("redis.pool_size must be > 0".into());
        }
        // Cache validations
        if self.cache.default_ttl_secs == 0 || self.cache.not_found_ttl_secs == 0 {
            return Err("cache TTLs must be > 0".into());
        }
        if self.cache.not_found_ttl_secs > self.cache.default_ttl_secs {
            return Err("cache.not_found_ttl_secs must be <= cache.default_ttl_secs".into());
        }
        if self.cache.invalidation_marker_ttl_secs == 0 {
            return Err("cache.invalidation_marker_ttl_secs must be > 0".into());
        }
        self.cache.ttl_policy()?;
        // Queue validations
        if self.queue.topic.trim().is_empty() {
            return Err("queue.topic must not be empty".into());
        }
        if self.queue.consumer_group.trim().is_empty() {
            return Err("queue.consumer_group must not be empty".into());
        }
        if self.queue.batch_size == 0 {
            return Err("queue.batch_size must be > 0".into());
        }
        // Chains validation
        self.chains.supported_chains()?;
        if self.chains.timeout_ms == 0 {
            return Err("chains.timeout_ms must be > 0".into());
        }
        // Notifications validation
        if self.notifications.enabled && self.notifications.queue_key.trim().is_empty() {
            return Err("notifications.enabled=true requires notifications.queue_key".into());
        }
        // Housekeeping validation
        if self.housekeeping.interval_secs == 0 {
            return Err("housekeeping.interval_secs must be > 0".into());
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        let ip: std::net::IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::from((ip, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    9090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Redis configuration for multi-instance deployments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades to local cache and in-memory queue)
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Cache key layout and TTLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Prepended to every key; separates deployments sharing one Redis
    #[serde(default)]
    pub key_prefix: String,

    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// TTL of cached "does not exist" answers
    #[serde(default = "default_not_found_ttl_secs")]
    pub not_found_ttl_secs: u64,

    /// How long an invalidation is remembered for racing fetches
    #[serde(default = "default_marker_ttl_secs")]
    pub invalidation_marker_ttl_secs: u64,

    /// Per resource kind overrides, e.g. `chains = 3600`
    #[serde(default)]
    pub ttl_overrides: HashMap<String, u64>,

    #[serde(default)]
    pub not_found_ttl_overrides: HashMap<String, u64>,
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_not_found_ttl_secs() -> u64 {
    30
}

fn default_marker_ttl_secs() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: String::new(),
            default_ttl_secs: default_ttl_secs(),
            not_found_ttl_secs: default_not_found_ttl_secs(),
            invalidation_marker_ttl_secs: default_marker_ttl_secs(),
            ttl_overrides: HashMap::new(),
            not_found_ttl_overrides: HashMap::new(),
        }
    }
}

impl CacheConfig {
    /// Build the TTL policy, rejecting unknown resource kinds and zero TTLs.
    pub fn ttl_policy(&self) -> Result<TtlPolicy, String> {
        let mut policy = TtlPolicy::new(
            Duration::from_secs(self.default_ttl_secs),
            Duration::from_secs(self.not_found_ttl_secs),
        );
        for (name, secs) in &self.ttl_overrides {
            let kind = parse_kind(name, "cache.ttl_overrides")?;
            if *secs == 0 {
                return Err(format!("cache.ttl_overrides.{name} must be > 0"));
            }
            policy = policy.with_override(kind, Duration::from_secs(*secs));
        }
        for (name, secs) in &self.not_found_ttl_overrides {
            let kind = parse_kind(name, "cache.not_found_ttl_overrides")?;
            if *secs == 0 {
                return Err(format!("cache.not_found_ttl_overrides.{name} must be > 0"));
            }
            policy = policy.with_not_found_override(kind, Duration::from_secs(*secs));
        }
        Ok(policy)
    }

    pub fn marker_ttl(&self) -> Duration {
        Duration::from_secs(self.invalidation_marker_ttl_secs)
    }
}

fn parse_kind(name: &str, section: &str) -> Result<ResourceKind, String> {
    serde_json::from_value(serde_json::Value::String(name.to_ascii_lowercase()))
        .map_err(|_| format!("{section}: unknown resource kind '{name}'"))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Consumer name within the group; defaults to the host name
    #[serde(default)]
    pub consumer_name: Option<String>,

    /// How long a stream read blocks waiting for entries
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_topic() -> String {
    "txgate:events".into()
}

fn default_consumer_group() -> String {
    "txgate".into()
}

fn default_block_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    32
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            consumer_group: default_consumer_group(),
            consumer_name: None,
            block_ms: default_block_ms(),
            batch_size: default_batch_size(),
        }
    }
}

impl QueueConfig {
    pub fn consumer_name(&self) -> String {
        self.consumer_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
            })
            .unwrap_or_else(|| "txgate".into())
    }

    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }
}

/// Which chains this deployment serves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// Config service base URL. When set, chain support is looked up there.
    #[serde(default)]
    pub config_service_url: Option<String>,

    /// Static allow-list used without a config service. Empty serves all chains.
    #[serde(default)]
    pub supported: Vec<String>,

    /// Upstream request timeout in milliseconds
    #[serde(default = "default_chains_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_chains_timeout_ms() -> u64 {
    10_000
}

impl Default for ChainsConfig {
    fn default() -> Self {
        Self {
            config_service_url: None,
            supported: Vec::new(),
            timeout_ms: default_chains_timeout_ms(),
        }
    }
}

impl ChainsConfig {
    pub fn supported_chains(&self) -> Result<Vec<ChainId>, String> {
        self.supported
            .iter()
            .map(|id| ChainId::new(id.as_str()).map_err(|e| format!("chains.supported: {e}")))
            .collect()
    }

    pub fn config_service_url(&self) -> Option<&str> {
        self.config_service_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,

    /// Redis list receiving notification jobs
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// How long an enqueued job id is remembered to drop redeliveries
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_queue_key() -> String {
    "txgate:notifications".into()
}

fn default_dedup_ttl_secs() -> u64 {
    3600
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            queue_key: default_queue_key(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HousekeepingConfig {
    /// Interval of the unsupported-chain slow path
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl HousekeepingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "txgate.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., TXGATE__CACHE__DEFAULT_TTL_SECS=30
        builder = builder.add_source(
            Environment::with_prefix("TXGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(!cfg.redis.enabled);
        assert_eq!(cfg.cache.default_ttl_secs, 60);
        assert_eq!(cfg.cache.not_found_ttl_secs, 30);
    }

    #[test]
    fn test_ttl_overrides_resolve_to_kinds() {
        let mut cfg = CacheConfig::default();
        cfg.ttl_overrides.insert("chains".into(), 3600);
        cfg.not_found_ttl_overrides.insert("safe".into(), 5);

        let policy = cfg.ttl_policy().unwrap();
        assert_eq!(policy.ttl_for(ResourceKind::Chains).fresh, Duration::from_secs(3600));
        assert_eq!(policy.ttl_for(ResourceKind::Safe).not_found, Duration::from_secs(5));
        assert_eq!(policy.ttl_for(ResourceKind::Token).fresh, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_override_kind_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.cache.ttl_overrides.insert("wallets".into(), 10);
        let err = cfg.validate().unwrap_err();
        assert!(err.contains("unknown resource kind 'wallets'"));
    }

    #[test]
    fn test_invalid_supported_chain_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.chains.supported = vec!["1".into(), "mainnet".into()];
        assert!(cfg.validate().unwrap_err().contains("chains.supported"));
    }

    #[test]
    fn test_consumer_name_prefers_configured_value() {
        let mut queue = QueueConfig::default();
        queue.consumer_name = Some("worker-7".into());
        assert_eq!(queue.consumer_name(), "worker-7");

        queue.consumer_name = None;
        assert!(!queue.consumer_name().is_empty());
    }
}
