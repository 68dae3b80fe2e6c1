//! Cache-aside decorator over any [`Repository`].
//!
//! Reads consult the cache first and populate it on a miss. Writes go to the
//! wrapped repository first; only after the write succeeds are the entity key
//! and the namespace's collection keys evicted. Repository errors pass through
//! unchanged and cache failures are never surfaced.
//!
//! A fill is dropped when an eviction covering its key lands while the value
//! is being loaded, so a slow read never overwrites a newer write. Ids that
//! cannot form a key are passed straight to the wrapped repository.
//!
//! # Example
//!
//! ```ignore
//! let users = CachedRepository::new(
//!     postgres_users,
//!     cache_client.clone(),
//!     Namespace::parse("users")?,
//!     Duration::from_secs(300),
//! );
//! let user = users.find_by_id(&tenant, "U1").await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tenant_cache_core::{CacheKey, CollectionQuery, KeyPattern, Namespace, TenantId};
use tenant_cache_storage::{CacheableEntity, Repository, RepositoryError};
use tracing::{debug, warn};

use crate::config::{TtlPolicy, WritePolicy};
use crate::store::{CacheClient, FillTicket, decode, encode};

/// A repository wrapper that caches reads for one namespace.
pub struct CachedRepository<R: Repository> {
    inner: R,
    client: CacheClient,
    namespace: Namespace,
    ttl: Duration,
    write_policy: WritePolicy,
}

impl<R: Repository> CachedRepository<R> {
    pub fn new(inner: R, client: CacheClient, namespace: Namespace, ttl: Duration) -> Self {
        Self {
            inner,
            client,
            namespace,
            ttl,
            write_policy: WritePolicy::default(),
        }
    }

    /// Wrap `inner`, taking the namespace's TTL from `policy`.
    pub fn with_policy(inner: R, client: CacheClient, namespace: Namespace, policy: &TtlPolicy) -> Self {
        let ttl = policy.ttl_for(&namespace);
        Self::new(inner, client, namespace, ttl)
    }

    pub fn with_write_policy(mut self, write_policy: WritePolicy) -> Self {
        self.write_policy = write_policy;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    /// Read and decode a cached value. An undecodable entry is evicted and
    /// treated as a miss.
    async fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = self.client.get(key).await?;
        match decode::<T>(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt cache entry, evicting");
                self.client.delete(key, "corrupt").await;
                None
            }
        }
    }

    /// Store a value. With a ticket this is a guarded fill of a loaded value;
    /// without one, an unconditional write-through.
    ///
    /// The write runs on its own task so it completes even if the caller is
    /// dropped mid-await; the caller still waits for it, which keeps a
    /// following write's eviction ordered after this fill.
    async fn populate<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T, ticket: Option<FillTicket>) {
        if !self.client.is_enabled() {
            return;
        }
        let bytes = match encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "value not cacheable, skipping fill");
                return;
            }
        };
        let client = self.client.clone();
        let ttl = self.ttl;
        let fill = tokio::spawn(async move {
            match ticket {
                Some(ticket) => {
                    client.fill(&key, bytes, ttl, ticket).await;
                }
                None => client.set(&key, bytes, ttl).await,
            }
        });
        if let Err(e) = fill.await {
            warn!(error = %e, "cache fill task failed");
        }
    }

    fn collection_pattern(&self, tenant: &TenantId) -> KeyPattern {
        KeyPattern::namespace(tenant, &self.namespace)
    }
}

#[async_trait]
impl<R: Repository> Repository for CachedRepository<R> {
    type Entity = R::Entity;

    async fn find_by_id(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<Self::Entity>, RepositoryError> {
        let key = match CacheKey::for_entity(tenant, &self.namespace, id) {
            Ok(key) => key,
            Err(e) => {
                debug!(tenant = %tenant, namespace = %self.namespace, error = %e, "uncacheable id, reading through");
                return self.inner.find_by_id(tenant, id).await;
            }
        };
        if let Some(entity) = self.lookup::<Self::Entity>(&key).await {
            return Ok(Some(entity));
        }

        let ticket = self.client.fill_ticket();
        let loaded = self.inner.find_by_id(tenant, id).await?;
        // Absent entities are not cached.
        if let Some(entity) = &loaded {
            self.populate(key, entity, Some(ticket)).await;
        }
        Ok(loaded)
    }

    async fn find_by_query(
        &self,
        tenant: &TenantId,
        query: &CollectionQuery,
    ) -> Result<Vec<Self::Entity>, RepositoryError> {
        let key = CacheKey::for_collection(tenant, &self.namespace, query);
        if let Some(entities) = self.lookup::<Vec<Self::Entity>>(&key).await {
            return Ok(entities);
        }

        let ticket = self.client.fill_ticket();
        let loaded = self.inner.find_by_query(tenant, query).await?;
        self.populate(key, loaded.as_slice(), Some(ticket)).await;
        Ok(loaded)
    }

    async fn save(
        &self,
        tenant: &TenantId,
        entity: Self::Entity,
    ) -> Result<Self::Entity, RepositoryError> {
        let saved = self.inner.save(tenant, entity).await?;

        // The wildcard covers the entity key as well as every collection key,
        // so it must run before any write-through set.
        let evicted = self
            .client
            .delete_by_pattern(&self.collection_pattern(tenant), "write")
            .await;

        let id = saved.entity_id();
        match (self.write_policy, CacheKey::for_entity(tenant, &self.namespace, &id)) {
            (WritePolicy::WriteThrough, Ok(key)) => self.populate(key, &saved, None).await,
            (WritePolicy::Evict, Ok(_)) => {}
            (_, Err(e)) => {
                // The write already happened; don't turn it into an error.
                warn!(tenant = %tenant, namespace = %self.namespace, error = %e, "saved entity has no cacheable id");
            }
        }
        debug!(tenant = %tenant, namespace = %self.namespace, id = %id, evicted, "cache updated after save");
        Ok(saved)
    }

    async fn delete_by_id(&self, tenant: &TenantId, id: &str) -> Result<(), RepositoryError> {
        let key = CacheKey::for_entity(tenant, &self.namespace, id).ok();
        self.inner.delete_by_id(tenant, id).await?;

        let entity_removed = match &key {
            Some(key) => self.client.delete(key, "delete").await,
            None => false,
        };
        let collections_removed = self
            .client
            .delete_by_pattern(&self.collection_pattern(tenant), "delete")
            .await;
        debug!(tenant = %tenant, namespace = %self.namespace, id = %id, entity_removed, collections_removed, "cache evicted after delete");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}

impl<R: Repository> std::fmt::Debug for CachedRepository<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRepository")
            .field("namespace", &self.namespace)
            .field("ttl", &self.ttl)
            .field("write_policy", &self.write_policy)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
