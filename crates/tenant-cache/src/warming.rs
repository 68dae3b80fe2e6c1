//! Startup cache warming.
//!
//! Warming runs after the host reports ready, never before: a slow or failing
//! target only costs cache hits, never availability. Each target runs with its
//! own timeout and is isolated from panics in the others.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde::Serialize;
use tenant_cache_core::{CacheKey, CollectionQuery, Namespace, TenantId};
use tenant_cache_storage::Repository;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::TtlPolicy;
use crate::error::WarmingError;
use crate::metrics;
use crate::store::{CacheClient, encode};

/// One pre-encoded cache entry.
#[derive(Debug, Clone)]
pub struct WarmEntry {
    pub key: CacheKey,
    pub value: Vec<u8>,
}

impl WarmEntry {
    pub fn encode<T: Serialize + ?Sized>(key: CacheKey, value: &T) -> Result<Self, WarmingError> {
        Ok(Self {
            key,
            value: encode(value)?,
        })
    }
}

/// A source of entries to preload.
#[async_trait]
pub trait WarmingTarget: Send + Sync {
    fn name(&self) -> &str;

    /// Namespace whose TTL applies to the loaded entries.
    fn namespace(&self) -> &Namespace;

    async fn load(&self) -> Result<Vec<WarmEntry>, WarmingError>;
}

/// What to read from a repository when warming.
#[derive(Debug, Clone)]
pub enum WarmLookup {
    Entity { tenant: TenantId, id: String },
    Collection { tenant: TenantId, query: CollectionQuery },
}

/// Warms a namespace by reading through a [`Repository`].
///
/// Produces the same keys and encoding as [`crate::CachedRepository`], so
/// warmed entries are served as ordinary hits.
pub struct RepositoryWarmingTarget<R: Repository> {
    name: String,
    namespace: Namespace,
    repository: R,
    lookups: Vec<WarmLookup>,
}

impl<R: Repository> RepositoryWarmingTarget<R> {
    pub fn new(name: impl Into<String>, namespace: Namespace, repository: R) -> Self {
        Self {
            name: name.into(),
            namespace,
            repository,
            lookups: Vec::new(),
        }
    }

    pub fn entity(mut self, tenant: TenantId, id: impl Into<String>) -> Self {
        self.lookups.push(WarmLookup::Entity {
            tenant,
            id: id.into(),
        });
        self
    }

    pub fn collection(mut self, tenant: TenantId, query: CollectionQuery) -> Self {
        self.lookups.push(WarmLookup::Collection { tenant, query });
        self
    }
}

#[async_trait]
impl<R: Repository> WarmingTarget for RepositoryWarmingTarget<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn load(&self) -> Result<Vec<WarmEntry>, WarmingError> {
        let mut entries = Vec::with_capacity(self.lookups.len());
        for lookup in &self.lookups {
            match lookup {
                WarmLookup::Entity { tenant, id } => {
                    let key = CacheKey::for_entity(tenant, &self.namespace, id)?;
                    if let Some(entity) = self.repository.find_by_id(tenant, id).await? {
                        entries.push(WarmEntry::encode(key, &entity)?);
                    }
                }
                WarmLookup::Collection { tenant, query } => {
                    let key = CacheKey::for_collection(tenant, &self.namespace, query);
                    let found = self.repository.find_by_query(tenant, query).await?;
                    entries.push(WarmEntry::encode(key, found.as_slice())?);
                }
            }
        }
        Ok(entries)
    }
}

/// Result for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Warmed { entries: usize },
    Failed { error: String },
    TimedOut,
    Panicked { message: String },
}

impl TargetOutcome {
    fn label(&self) -> &'static str {
        match self {
            Self::Warmed { .. } => "warmed",
            Self::Failed { .. } => "failed",
            Self::TimedOut => "timed_out",
            Self::Panicked { .. } => "panicked",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Warmed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub name: String,
    pub outcome: TargetOutcome,
    pub elapsed: Duration,
}

/// Per-target results of one warming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmingReport {
    pub targets: Vec<TargetReport>,
}

impl WarmingReport {
    pub fn warmed(&self) -> usize {
        self.targets.iter().filter(|t| t.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.targets.len() - self.warmed()
    }

    pub fn entries(&self) -> usize {
        self.targets
            .iter()
            .map(|t| match t.outcome {
                TargetOutcome::Warmed { entries } => entries,
                _ => 0,
            })
            .sum()
    }

    pub fn get(&self, name: &str) -> Option<&TargetReport> {
        self.targets.iter().find(|t| t.name == name)
    }
}

/// Runs registered warming targets against the cache.
pub struct CacheWarmer {
    client: CacheClient,
    ttl: TtlPolicy,
    target_timeout: Duration,
    targets: Vec<Arc<dyn WarmingTarget>>,
}

impl CacheWarmer {
    pub fn new(client: CacheClient, ttl: TtlPolicy, target_timeout: Duration) -> Self {
        Self {
            client,
            ttl,
            target_timeout,
            targets: Vec::new(),
        }
    }

    pub fn register(&mut self, target: Arc<dyn WarmingTarget>) {
        info!(target = target.name(), namespace = %target.namespace(), "Registered warming target");
        self.targets.push(target);
    }

    pub fn with_target(mut self, target: Arc<dyn WarmingTarget>) -> Self {
        self.register(target);
        self
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Run every target concurrently and report each outcome.
    pub async fn run(&self) -> WarmingReport {
        if !self.client.is_enabled() || self.targets.is_empty() {
            return WarmingReport::default();
        }
        let started = Instant::now();
        let targets = join_all(self.targets.iter().map(|t| self.run_target(Arc::clone(t)))).await;
        let report = WarmingReport { targets };
        info!(
            warmed = report.warmed(),
            failed = report.failed(),
            entries = report.entries(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cache warming finished"
        );
        report
    }

    async fn run_target(&self, target: Arc<dyn WarmingTarget>) -> TargetReport {
        let name = target.name().to_string();
        let started = Instant::now();
        let ticket = self.client.fill_ticket();
        let loaded = tokio::time::timeout(
            self.target_timeout,
            AssertUnwindSafe(target.load()).catch_unwind(),
        )
        .await;

        let outcome = match loaded {
            Ok(Ok(Ok(entries))) => {
                let ttl = self.ttl.ttl_for(target.namespace());
                let loaded = entries.len();
                let mut stored = 0;
                for entry in entries {
                    // Keys evicted while the target was loading are left for the next read.
                    if self.client.fill(&entry.key, entry.value, ttl, ticket).await {
                        stored += 1;
                    }
                }
                if stored < loaded {
                    debug!(target = %name, loaded, stored, "skipped warm entries evicted during load");
                }
                TargetOutcome::Warmed { entries: stored }
            }
            Ok(Ok(Err(e))) => {
                warn!(target = %name, error = %e, "warming target failed");
                TargetOutcome::Failed {
                    error: e.to_string(),
                }
            }
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(target = %name, panic = %message, "warming target panicked");
                TargetOutcome::Panicked { message }
            }
            Err(_) => {
                warn!(target = %name, timeout_ms = self.target_timeout.as_millis() as u64, "warming target timed out");
                TargetOutcome::TimedOut
            }
        };
        metrics::record_warming_target(outcome.label());
        TargetReport {
            name,
            outcome,
            elapsed: started.elapsed(),
        }
    }

    /// Wait until `ready` turns true, then warm in the background.
    ///
    /// If the readiness sender is dropped first, warming is skipped.
    pub fn spawn_after_ready(self, mut ready: watch::Receiver<bool>) -> JoinHandle<WarmingReport> {
        tokio::spawn(async move {
            if ready.wait_for(|ready| *ready).await.is_err() {
                warn!("readiness signal dropped before ready, skipping cache warming");
                return WarmingReport::default();
            }
            self.run().await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalBackend;

    struct Fixed {
        name: &'static str,
        namespace: Namespace,
        entries: Vec<WarmEntry>,
    }

    #[async_trait]
    impl WarmingTarget for Fixed {
        fn name(&self) -> &str {
            self.name
        }
        fn namespace(&self) -> &Namespace {
            &self.namespace
        }
        async fn load(&self) -> Result<Vec<WarmEntry>, WarmingError> {
            Ok(self.entries.clone())
        }
    }

    struct Panicking(Namespace);

    #[async_trait]
    impl WarmingTarget for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }
        fn namespace(&self) -> &Namespace {
            &self.0
        }
        async fn load(&self) -> Result<Vec<WarmEntry>, WarmingError> {
            panic!("boom")
        }
    }

    struct Slow(Namespace);

    #[async_trait]
    impl WarmingTarget for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn namespace(&self) -> &Namespace {
            &self.0
        }
        async fn load(&self) -> Result<Vec<WarmEntry>, WarmingError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    /// Loads a stale value while a write evicts its namespace.
    struct RacedByWrite {
        client: CacheClient,
        key: CacheKey,
    }

    #[async_trait]
    impl WarmingTarget for RacedByWrite {
        fn name(&self) -> &str {
            "raced"
        }
        fn namespace(&self) -> &Namespace {
            static USERS: std::sync::OnceLock<Namespace> = std::sync::OnceLock::new();
            USERS.get_or_init(|| ns("users"))
        }
        async fn load(&self) -> Result<Vec<WarmEntry>, WarmingError> {
            let stale = WarmEntry::encode(self.key.clone(), "old")?;
            let acme = TenantId::new("acme").unwrap();
            self.client
                .delete_by_pattern(&crate::KeyPattern::namespace(&acme, self.namespace()), "write")
                .await;
            self.client
                .set(&self.key, encode("new").unwrap(), Duration::from_secs(60))
                .await;
            Ok(vec![stale])
        }
    }

    fn client() -> CacheClient {
        CacheClient::new(Arc::new(LocalBackend::default()), Duration::from_millis(100))
    }

    fn ns(value: &'static str) -> Namespace {
        Namespace::parse(value).unwrap()
    }

    #[tokio::test]
    async fn test_one_bad_target_does_not_stop_the_others() {
        let client = client();
        let key = CacheKey::for_global(&ns("config"), "flags").unwrap();
        let warmer = CacheWarmer::new(client.clone(), TtlPolicy::default(), Duration::from_millis(50))
            .with_target(Arc::new(Fixed {
                name: "flags",
                namespace: ns("config"),
                entries: vec![WarmEntry::encode(key.clone(), &vec!["beta"]).unwrap()],
            }))
            .with_target(Arc::new(Panicking(ns("users"))))
            .with_target(Arc::new(Slow(ns("orders"))));

        let report = warmer.run().await;

        assert_eq!(report.warmed(), 1);
        assert_eq!(report.failed(), 2);
        assert_eq!(report.get("flags").unwrap().outcome, TargetOutcome::Warmed { entries: 1 });
        assert!(matches!(report.get("panicking").unwrap().outcome, TargetOutcome::Panicked { ref message } if message == "boom"));
        assert_eq!(report.get("slow").unwrap().outcome, TargetOutcome::TimedOut);
        assert!(client.exists(&key).await);
    }

    #[tokio::test]
    async fn test_waits_for_readiness() {
        let client = client();
        let key = CacheKey::for_global(&ns("config"), "flags").unwrap();
        let warmer = CacheWarmer::new(client.clone(), TtlPolicy::default(), Duration::from_secs(1))
            .with_target(Arc::new(Fixed {
                name: "flags",
                namespace: ns("config"),
                entries: vec![WarmEntry::encode(key.clone(), "on").unwrap()],
            }));
        let (ready_tx, ready_rx) = watch::channel(false);

        let handle = warmer.spawn_after_ready(ready_rx);
        tokio::task::yield_now().await;
        assert!(!client.exists(&key).await);

        ready_tx.send(true).unwrap();
        let report = handle.await.unwrap();
        assert_eq!(report.entries(), 1);
        assert!(client.exists(&key).await);
    }

    #[tokio::test]
    async fn test_dropped_readiness_skips_warming() {
        let warmer = CacheWarmer::new(client(), TtlPolicy::default(), Duration::from_secs(1))
            .with_target(Arc::new(Slow(ns("orders"))));
        let (ready_tx, ready_rx) = watch::channel(false);
        drop(ready_tx);

        let report = warmer.spawn_after_ready(ready_rx).await.unwrap();
        assert!(report.targets.is_empty());
    }

    #[tokio::test]
    async fn test_entry_evicted_during_load_is_not_stored() {
        let client = client();
        let acme = TenantId::new("acme").unwrap();
        let key = CacheKey::for_entity(&acme, &ns("users"), "U1").unwrap();
        let warmer = CacheWarmer::new(client.clone(), TtlPolicy::default(), Duration::from_secs(1))
            .with_target(Arc::new(RacedByWrite {
                client: client.clone(),
                key: key.clone(),
            }));

        let report = warmer.run().await;

        assert_eq!(report.get("raced").unwrap().outcome, TargetOutcome::Warmed { entries: 0 });
        let cached: String = crate::store::decode(&client.get(&key).await.unwrap()).unwrap();
        assert_eq!(cached, "new");
    }
}
