//! Tenant-aware cache-aside layer.
//!
//! - [`CachedRepository`] wraps any [`Repository`] and serves reads from the
//!   cache, evicting after successful writes.
//! - [`InvalidationListener`] applies change events from the system of record,
//!   fed locally or by [`RedisEventSource`].
//! - [`CacheWarmer`] preloads hot keys once the host reports ready.
//!
//! The cache is never authoritative: every backend failure degrades to a
//! repository read, and nothing in this crate blocks startup except invalid
//! configuration.
//!
//! [`CacheRuntime::start`] also installs a fmt subscriber at `logging.level`
//! and a Prometheus recorder; scrape it with [`render_metrics`].
//!
//! ```ignore
//! let runtime = CacheRuntime::start(loader::load_config(None)?).await?;
//! let users = runtime.cached(postgres_users, Namespace::parse("users")?);
//! let user = users.find_by_id(&tenant, "U1").await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod health;
pub mod invalidation;
pub mod metrics;
pub mod observability;
pub mod repository;
pub mod store;
pub mod warming;

pub use bootstrap::{CacheRuntime, connect_redis, create_cache_client};
pub use self::config::{CacheAppConfig, TtlPolicy, WritePolicy, loader};
pub use error::{CacheError, ConfigError, EventSourceError, WarmingError};
pub use health::{CacheHealth, CacheHealthStatus, check_health};
pub use self::metrics::{init_metrics, render_metrics};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use invalidation::{
    InvalidationListener, InvalidationOutcome, InvalidationSender, ListenerClosed,
    ListenerSummary, RedisEventSource, publish_invalidation,
};
pub use repository::CachedRepository;
pub use store::{CacheBackend, CacheClient, CacheStats, FillTicket, LocalBackend, RedisBackend};
pub use warming::{
    CacheWarmer, RepositoryWarmingTarget, TargetOutcome, WarmEntry, WarmingReport, WarmingTarget,
};

pub use tenant_cache_core::{
    CacheKey, ChangeKind, CollectionQuery, InvalidationEvent, InvalidationMessage, KeyPattern,
    Namespace, TenantId,
};
pub use tenant_cache_storage::{CacheableEntity, Repository, RepositoryError};
