use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use tenant_cache_core::Namespace;

use crate::error::ConfigError;
use crate::invalidation::DEFAULT_CHANNEL;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheAppConfig {
    #[serde(default)]
    pub cache: CacheSettings,
    /// Redis connection; the local backend is used when disabled or unreachable
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub invalidation: InvalidationSettings,
    #[serde(default)]
    pub warming: WarmingSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

impl CacheAppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // TTLs
        if self.cache.default_ttl_secs == 0 {
            return Err(ConfigError::validation("cache.default_ttl_secs must be > 0"));
        }
        for (name, ttl) in &self.cache.namespace_ttl_secs {
            Namespace::parse(name.clone())?;
            if *ttl == 0 {
                return Err(ConfigError::validation(format!(
                    "cache.namespace_ttl_secs.{name} must be > 0"
                )));
            }
        }
        // Timeouts: a cache call must give up well before the caller would
        if self.cache.operation_timeout_ms == 0 {
            return Err(ConfigError::validation("cache.operation_timeout_ms must be > 0"));
        }
        if self.cache.operation_timeout_ms >= self.cache.store_timeout_ms {
            return Err(ConfigError::validation(
                "cache.operation_timeout_ms must be < cache.store_timeout_ms",
            ));
        }
        if self.cache.local_max_entries == 0 {
            return Err(ConfigError::validation("cache.local_max_entries must be > 0"));
        }
        // Redis
        if self.redis.enabled {
            if self.redis.url.trim().is_empty() {
                return Err(ConfigError::validation("redis.enabled=true requires redis.url"));
            }
            if self.redis.pool_size == 0 {
                return Err(ConfigError::validation("redis.pool_size must be > 0"));
            }
        }
        // Invalidation
        if self.invalidation.queue_capacity == 0 {
            return Err(ConfigError::validation("invalidation.queue_capacity must be > 0"));
        }
        if self.invalidation.channel.trim().is_empty() {
            return Err(ConfigError::validation("invalidation.channel must not be empty"));
        }
        // Warming
        if self.warming.target_timeout_ms == 0 {
            return Err(ConfigError::validation("warming.target_timeout_ms must be > 0"));
        }
        // Logging
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        Ok(())
    }
}

/// What a successful save does to the saved entity's cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Evict, then store the saved state under its entity key.
    #[default]
    WriteThrough,
    /// Evict only; the next read repopulates.
    Evict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Master switch; when false every cache call is a no-op
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// TTL for namespaces without an override
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    /// Per-namespace TTL overrides, e.g. `users = 600`
    #[serde(default)]
    pub namespace_ttl_secs: HashMap<String, u64>,
    /// Bound on every single cache call
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
    /// Reference timeout of the system of record; cache calls must stay below it
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default)]
    pub write_policy: WritePolicy,
    /// Entry bound for the in-process backend
    #[serde(default = "default_local_max_entries")]
    pub local_max_entries: usize,
}

fn default_true() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_operation_timeout_ms() -> u64 {
    250
}
fn default_store_timeout_ms() -> u64 {
    5000
}
fn default_local_max_entries() -> usize {
    10_000
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: default_ttl_secs(),
            namespace_ttl_secs: HashMap::new(),
            operation_timeout_ms: default_operation_timeout_ms(),
            store_timeout_ms: default_store_timeout_ms(),
            write_policy: WritePolicy::default(),
            local_max_entries: default_local_max_entries(),
        }
    }
}

impl CacheSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Build the TTL policy, validating every override's namespace.
    pub fn ttl_policy(&self) -> Result<TtlPolicy, ConfigError> {
        let mut policy = TtlPolicy::new(Duration::from_secs(self.default_ttl_secs));
        for (name, secs) in &self.namespace_ttl_secs {
            let namespace = Namespace::parse(name.clone())?;
            policy = policy.with_override(namespace, Duration::from_secs(*secs));
        }
        Ok(policy)
    }
}

/// Entry lifetime per namespace.
///
/// Nested namespaces inherit the closest configured parent's TTL, so an
/// override for `locations` also covers `locations:zones`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    default: Duration,
    overrides: HashMap<Namespace, Duration>,
}

impl TtlPolicy {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, namespace: Namespace, ttl: Duration) -> Self {
        self.overrides.insert(namespace, ttl);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default
    }

    pub fn ttl_for(&self, namespace: &Namespace) -> Duration {
        if let Some(ttl) = self.overrides.get(namespace) {
            return *ttl;
        }
        self.overrides
            .iter()
            .filter(|(parent, _)| namespace.is_within(parent))
            .max_by_key(|(parent, _)| parent.segments().count())
            .map(|(_, ttl)| *ttl)
            .unwrap_or(self.default)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(default_ttl_secs()))
    }
}

/// Redis configuration for the shared cache backend and the event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (default: false, uses the in-process cache only)
    #[serde(default)]
    pub enabled: bool,
    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Connection pool size (default: 10)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Pool wait/create timeout in milliseconds (default: 5000)
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}
fn default_pool_size() -> usize {
    10
}
fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationSettings {
    /// Consume change events (requires Redis for the pub/sub source)
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pub/sub channel carrying JSON invalidation messages
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Bound on buffered, not yet applied events
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}
fn default_queue_capacity() -> usize {
    1024
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            channel: default_channel(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmingSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_target_timeout_ms")]
    pub target_timeout_ms: u64,
}

fn default_target_timeout_ms() -> u64 {
    30_000
}

impl Default for WarmingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            target_timeout_ms: default_target_timeout_ms(),
        }
    }
}

impl WarmingSettings {
    pub fn target_timeout(&self) -> Duration {
        Duration::from_millis(self.target_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Install the fmt subscriber on startup. Hosts with their own subscriber
    /// set this to false.
    #[serde(default = "default_true")]
    pub init_subscriber: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            init_subscriber: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder on startup
    #[serde(default = "default_true")]
    pub prometheus: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { prometheus: true }
    }
}

pub mod loader {
    use super::CacheAppConfig;
    use crate::error::ConfigError;
    use config::{Config, Environment, File, Map};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "tenant-cache.toml";
    pub const ENV_PREFIX: &str = "TENANT_CACHE";

    /// Load configuration from a file (if present) and environment overrides,
    /// e.g. `TENANT_CACHE__REDIS__URL=redis://cache:6379`.
    pub fn load_config(path: Option<&str>) -> Result<CacheAppConfig, ConfigError> {
        load_config_with_env(path, None)
    }

    /// Like [`load_config`], reading overrides from `env` instead of the
    /// process environment when given.
    pub fn load_config_with_env(
        path: Option<&str>,
        env: Option<Map<String, String>>,
    ) -> Result<CacheAppConfig, ConfigError> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__")
                .source(env),
        );
        let merged: CacheAppConfig = builder.build()?.try_deserialize()?;
        merged.validate()?;
        Ok(merged)
    }
}
