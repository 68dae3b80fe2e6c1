//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tenant_cache::{
    CacheBackend, CacheClient, CacheError, CacheableEntity, CollectionQuery, KeyPattern,
    LocalBackend, Repository, RepositoryError, TenantId,
};
use tenant_cache_storage::InMemoryRepository;
use tokio::sync::Notify;

pub const TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub status: String,
}

impl CacheableEntity for User {
    fn entity_id(&self) -> String {
        self.id.clone()
    }
}

pub fn user(id: &str, name: &str, status: &str) -> User {
    User {
        id: id.into(),
        name: name.into(),
        status: status.into(),
    }
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::new(id).expect("valid tenant")
}

pub fn local_client() -> CacheClient {
    CacheClient::new(Arc::new(LocalBackend::default()), TIMEOUT)
}

/// Pauses one read after it has loaded its result.
struct ReadHold {
    loaded: Arc<Notify>,
    release: Arc<Notify>,
}

/// In-memory repository that counts reads and can be told to fail.
pub struct TrackedRepository<E: CacheableEntity> {
    pub store: InMemoryRepository<E>,
    reads: AtomicUsize,
    failing: AtomicBool,
    hold: Mutex<Option<ReadHold>>,
}

impl<E: CacheableEntity> TrackedRepository<E> {
    pub fn new(namespace: &str) -> Arc<Self> {
        Arc::new(Self {
            store: InMemoryRepository::new(namespace),
            reads: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            hold: Mutex::new(None),
        })
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make the next read stop after loading. The first handle fires once the
    /// read has its result; notify the second to let it return.
    pub fn hold_next_read(&self) -> (Arc<Notify>, Arc<Notify>) {
        let loaded = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(ReadHold {
            loaded: Arc::clone(&loaded),
            release: Arc::clone(&release),
        });
        (loaded, release)
    }

    async fn pause_if_held(&self) {
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            hold.loaded.notify_one();
            hold.release.notified().await;
        }
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RepositoryError::connection_error("database unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl<E: CacheableEntity> Repository for TrackedRepository<E> {
    type Entity = E;

    async fn find_by_id(&self, tenant: &TenantId, id: &str) -> Result<Option<E>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let found = self.store.find_by_id(tenant, id).await;
        self.pause_if_held().await;
        found
    }

    async fn find_by_query(
        &self,
        tenant: &TenantId,
        query: &CollectionQuery,
    ) -> Result<Vec<E>, RepositoryError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let found = self.store.find_by_query(tenant, query).await;
        self.pause_if_held().await;
        found
    }

    async fn save(&self, tenant: &TenantId, entity: E) -> Result<E, RepositoryError> {
        self.check()?;
        self.store.save(tenant, entity).await
    }

    async fn delete_by_id(&self, tenant: &TenantId, id: &str) -> Result<(), RepositoryError> {
        self.check()?;
        self.store.delete_by_id(tenant, id).await
    }

    fn backend_name(&self) -> &'static str {
        "tracked"
    }
}

/// Backend whose every call fails, as if Redis were down.
pub struct DownBackend;

#[async_trait]
impl CacheBackend for DownBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(CacheError::Pool("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Pool("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Pool("connection refused".into()))
    }

    async fn delete_by_pattern(&self, _pattern: &KeyPattern) -> Result<u64, CacheError> {
        Err(CacheError::Pool("connection refused".into()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Pool("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Err(CacheError::Pool("connection refused".into()))
    }

    fn name(&self) -> &'static str {
        "down"
    }
}
