//! In-memory repository for tests and local development.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde_json::Value;
use tenant_cache_core::{CollectionQuery, TenantId};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RepositoryError;
use crate::traits::{CacheableEntity, Repository};

/// Repository keeping entities in a tenant-partitioned map.
///
/// Queries match top-level JSON fields of the serialized entity: every query
/// parameter must name a field whose scalar value equals one of the
/// parameter's values. Query names arrive lowercased, so field names are
/// compared case-insensitively (`lastName` matches `lastname`). Results are
/// ordered by entity id.
pub struct InMemoryRepository<E: CacheableEntity> {
    namespace: String,
    data: RwLock<BTreeMap<(TenantId, String), E>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: CacheableEntity> InMemoryRepository<E> {
    /// Create an empty repository. `namespace` only appears in error messages.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            data: RwLock::new(BTreeMap::new()),
            _entity: PhantomData,
        }
    }

    /// Number of stored entities across all tenants.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn field<'a>(entity: &'a Value, name: &str) -> Option<&'a Value> {
    entity.get(name).or_else(|| {
        entity
            .as_object()?
            .iter()
            .find(|(key, _)| key.to_lowercase() == name)
            .map(|(_, value)| value)
    })
}

fn matches_query(entity: &Value, query: &CollectionQuery) -> bool {
    query.iter().all(|(name, values)| {
        field(entity, name)
            .and_then(scalar)
            .is_some_and(|field| values.contains(&field))
    })
}

#[async_trait]
impl<E: CacheableEntity> Repository for InMemoryRepository<E> {
    type Entity = E;

    async fn find_by_id(&self, tenant: &TenantId, id: &str) -> Result<Option<E>, RepositoryError> {
        let data = self.data.read().await;
        Ok(data.get(&(tenant.clone(), id.to_string())).cloned())
    }

    async fn find_by_query(
        &self,
        tenant: &TenantId,
        query: &CollectionQuery,
    ) -> Result<Vec<E>, RepositoryError> {
        let data = self.data.read().await;
        let mut found = Vec::new();
        for ((owner, _), entity) in data.iter() {
            if owner != tenant {
                continue;
            }
            let json = serde_json::to_value(entity)
                .map_err(|e| RepositoryError::internal(format!("serialize entity: {e}")))?;
            if matches_query(&json, query) {
                found.push(entity.clone());
            }
        }
        Ok(found)
    }

    async fn save(&self, tenant: &TenantId, entity: E) -> Result<E, RepositoryError> {
        let id = entity.entity_id();
        if id.is_empty() {
            return Err(RepositoryError::invalid_entity("entity id must not be empty"));
        }
        self.data
            .write()
            .await
            .insert((tenant.clone(), id.clone()), entity.clone());
        debug!(tenant = %tenant, namespace = %self.namespace, id = %id, "Saved entity");
        Ok(entity)
    }

    async fn delete_by_id(&self, tenant: &TenantId, id: &str) -> Result<(), RepositoryError> {
        let removed = self
            .data
            .write()
            .await
            .remove(&(tenant.clone(), id.to_string()));
        match removed {
            Some(_) => Ok(()),
            None => Err(RepositoryError::not_found(&self.namespace, id)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl<E: CacheableEntity> std::fmt::Debug for InMemoryRepository<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRepository")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
