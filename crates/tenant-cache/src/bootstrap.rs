//! Wiring a cache runtime from configuration.

use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::Pool;
use tenant_cache_core::{InvalidationEvent, Namespace};
use tenant_cache_storage::Repository;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{CacheAppConfig, RedisConfig, TtlPolicy};
use crate::error::{ConfigError, EventSourceError};
use crate::invalidation::{
    InvalidationListener, InvalidationSender, ListenerSummary, RedisEventSource,
    publish_invalidation,
};
use crate::metrics;
use crate::observability;
use crate::repository::CachedRepository;
use crate::store::{CacheClient, LocalBackend, RedisBackend};
use crate::warming::{CacheWarmer, WarmingReport};

/// Build a Redis pool and verify it with one connection.
///
/// Returns `None` when Redis is disabled or unreachable.
pub async fn connect_redis(config: &RedisConfig) -> Option<Pool> {
    if !config.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return None;
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let timeout = Duration::from_millis(config.timeout_ms);
    let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
    pool_config.timeouts.wait = Some(timeout);
    pool_config.timeouts.create = Some(timeout);
    pool_config.timeouts.recycle = Some(timeout);
    let mut redis_config = deadpool_redis::Config::from_url(&config.url);
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create Redis pool. Falling back to local cache.");
            return None;
        }
    };

    match pool.get().await {
        Ok(_) => {
            tracing::info!("Connected to Redis");
            Some(pool)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to connect to Redis. Falling back to local cache.");
            None
        }
    }
}

/// Build a cache client from configuration, falling back to the local
/// backend when Redis is unavailable.
pub async fn create_cache_client(config: &CacheAppConfig) -> CacheClient {
    let (client, _) = build_client(config).await;
    client
}

async fn build_client(config: &CacheAppConfig) -> (CacheClient, Option<Pool>) {
    if !config.cache.enabled {
        tracing::info!("Cache disabled, all reads go to the repository");
        return (CacheClient::disabled(), None);
    }
    let timeout = config.cache.operation_timeout();
    match connect_redis(&config.redis).await {
        Some(pool) => (
            CacheClient::new(Arc::new(RedisBackend::new(pool.clone())), timeout),
            Some(pool),
        ),
        None => (
            CacheClient::new(Arc::new(LocalBackend::new(config.cache.local_max_entries)), timeout),
            None,
        ),
    }
}

/// A running cache layer: client, invalidation worker and event source.
pub struct CacheRuntime {
    config: CacheAppConfig,
    client: CacheClient,
    ttl_policy: TtlPolicy,
    redis: Option<Pool>,
    invalidations: Option<InvalidationSender>,
    shutdown: CancellationToken,
    listener: Option<JoinHandle<ListenerSummary>>,
    source: Option<JoinHandle<()>>,
}

impl CacheRuntime {
    /// Validate `config`, connect, and start the invalidation pipeline.
    ///
    /// Also installs the fmt subscriber at `logging.level` and the Prometheus
    /// recorder, unless `logging.init_subscriber` or `metrics.prometheus` turn
    /// them off. Only configuration errors fail; an unreachable Redis degrades
    /// to the local backend without a pub/sub source.
    pub async fn start(config: CacheAppConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.logging.init_subscriber {
            observability::init_tracing_with_level(&config.logging.level);
        }
        if config.metrics.prometheus {
            metrics::init_metrics();
        }
        let ttl_policy = config.cache.ttl_policy()?;
        let (client, redis) = build_client(&config).await;
        let shutdown = CancellationToken::new();

        let (invalidations, listener, source) =
            if config.invalidation.enabled && client.is_enabled() {
                let listener = InvalidationListener::new(client.clone(), config.invalidation.queue_capacity);
                let (sender, handle) = listener.start(shutdown.child_token());
                let source = redis.as_ref().map(|_| {
                    RedisEventSource::new(
                        config.redis.url.clone(),
                        config.invalidation.channel.clone(),
                        sender.clone(),
                    )
                    .start(shutdown.child_token())
                });
                (Some(sender), Some(handle), source)
            } else {
                (None, None, None)
            };

        tracing::info!(
            backend = client.backend_name(),
            invalidation = invalidations.is_some(),
            subscribed = source.is_some(),
            "cache runtime started"
        );

        Ok(Self {
            config,
            client,
            ttl_policy,
            redis,
            invalidations,
            shutdown,
            listener,
            source,
        })
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    pub fn config(&self) -> &CacheAppConfig {
        &self.config
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl_policy
    }

    /// Wrap a repository with the configured TTL and write policy.
    pub fn cached<R: Repository>(&self, inner: R, namespace: Namespace) -> CachedRepository<R> {
        CachedRepository::with_policy(inner, self.client.clone(), namespace, &self.ttl_policy)
            .with_write_policy(self.config.cache.write_policy)
    }

    /// Local producer handle for the invalidation queue.
    pub fn invalidations(&self) -> Option<&InvalidationSender> {
        self.invalidations.as_ref()
    }

    /// Announce a change to every node.
    ///
    /// With Redis the event goes out on the channel, which this node also
    /// consumes. Without Redis it is applied locally.
    pub async fn publish(&self, event: &InvalidationEvent) -> Result<(), EventSourceError> {
        if let Some(pool) = &self.redis {
            return publish_invalidation(pool, &self.config.invalidation.channel, event).await;
        }
        if let Some(sender) = &self.invalidations {
            if sender.send_event(event).await.is_err() {
                tracing::warn!("invalidation listener closed, event dropped");
            }
        }
        Ok(())
    }

    pub fn warmer(&self) -> CacheWarmer {
        CacheWarmer::new(
            self.client.clone(),
            self.ttl_policy.clone(),
            self.config.warming.target_timeout(),
        )
    }

    /// Run `warmer` once `ready` turns true. `None` when warming is disabled.
    pub fn spawn_warming(
        &self,
        warmer: CacheWarmer,
        ready: watch::Receiver<bool>,
    ) -> Option<JoinHandle<WarmingReport>> {
        if !self.config.warming.enabled {
            tracing::info!("cache warming disabled");
            return None;
        }
        Some(warmer.spawn_after_ready(ready))
    }

    /// Stop the event source, drain the invalidation queue and wait for both.
    pub async fn shutdown(mut self) -> ListenerSummary {
        self.shutdown.cancel();
        // Drop our sender so the queue can close once the source is gone.
        self.invalidations.take();
        if let Some(source) = self.source.take() {
            if let Err(e) = source.await {
                tracing::warn!(error = %e, "event source task failed");
            }
        }
        match self.listener.take() {
            Some(listener) => listener.await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalidation listener task failed");
                ListenerSummary::default()
            }),
            None => ListenerSummary::default(),
        }
    }
}
