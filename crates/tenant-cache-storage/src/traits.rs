//! The repository contract consumed by the cache decorator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use tenant_cache_core::{CollectionQuery, TenantId};

use crate::error::RepositoryError;

/// Marker trait for entities that can be stored in the cache.
///
/// `entity_id()` must be stable for the lifetime of the entity; it is the
/// identifier used to build the entity's cache key after a save.
pub trait CacheableEntity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn entity_id(&self) -> String;
}

/// Data-access object for one entity type.
///
/// Tenant identity is an explicit argument on every call. Implementations must
/// be thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// async fn load_user(repo: &dyn Repository<Entity = User>, tenant: &TenantId) -> Result<User, RepositoryError> {
///     repo.find_by_id(tenant, "U1")
///         .await?
///         .ok_or_else(|| RepositoryError::not_found("users", "U1"))
/// }
/// ```
#[async_trait]
pub trait Repository: Send + Sync {
    type Entity: CacheableEntity;

    /// Reads one entity. Returns `None` if it does not exist.
    async fn find_by_id(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<Self::Entity>, RepositoryError>;

    /// Reads every entity matching a query.
    async fn find_by_query(
        &self,
        tenant: &TenantId,
        query: &CollectionQuery,
    ) -> Result<Vec<Self::Entity>, RepositoryError>;

    /// Creates or replaces an entity and returns the stored state.
    async fn save(
        &self,
        tenant: &TenantId,
        entity: Self::Entity,
    ) -> Result<Self::Entity, RepositoryError>;

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the entity does not exist.
    async fn delete_by_id(&self, tenant: &TenantId, id: &str) -> Result<(), RepositoryError>;

    /// Name of the backing store for logging.
    fn backend_name(&self) -> &'static str {
        "unknown"
    }
}

#[async_trait]
impl<R> Repository for Arc<R>
where
    R: Repository + ?Sized,
{
    type Entity = R::Entity;

    async fn find_by_id(
        &self,
        tenant: &TenantId,
        id: &str,
    ) -> Result<Option<Self::Entity>, RepositoryError> {
        (**self).find_by_id(tenant, id).await
    }

    async fn find_by_query(
        &self,
        tenant: &TenantId,
        query: &CollectionQuery,
    ) -> Result<Vec<Self::Entity>, RepositoryError> {
        (**self).find_by_query(tenant, query).await
    }

    async fn save(
        &self,
        tenant: &TenantId,
        entity: Self::Entity,
    ) -> Result<Self::Entity, RepositoryError> {
        (**self).save(tenant, entity).await
    }

    async fn delete_by_id(&self, tenant: &TenantId, id: &str) -> Result<(), RepositoryError> {
        (**self).delete_by_id(tenant, id).await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }
}
