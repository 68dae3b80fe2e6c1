//! Domain-change notifications consumed by the invalidation listener.
//!
//! The listener receives [`InvalidationMessage`]s from the message bus, turns
//! them into validated [`InvalidationEvent`]s and resolves each event into an
//! [`EvictionPlan`]. Resolution is pure, so applying the same event twice
//! always produces the same plan.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{EventError, KeySchemeError};
use crate::key::{CacheKey, KeyPattern};
use crate::tenant::{Namespace, TenantId};

/// Kind of change reported for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Updated => "updated",
            ChangeKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ChangeKind::Created),
            "updated" => Ok(ChangeKind::Updated),
            "deleted" => Ok(ChangeKind::Deleted),
            other => Err(format!("unknown change kind: {other}")),
        }
    }
}

/// A validated change notification for one tenant and namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    pub tenant: TenantId,
    pub namespace: Namespace,
    /// Affected entity, or `None` for namespace-wide changes.
    pub entity_id: Option<String>,
    pub kind: ChangeKind,
    pub occurred_at: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(
        kind: ChangeKind,
        tenant: TenantId,
        namespace: Namespace,
        entity_id: Option<String>,
    ) -> Self {
        Self {
            tenant,
            namespace,
            entity_id,
            kind,
            occurred_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn created(tenant: TenantId, namespace: Namespace, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Created, tenant, namespace, Some(entity_id.into()))
    }

    pub fn updated(tenant: TenantId, namespace: Namespace, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Updated, tenant, namespace, Some(entity_id.into()))
    }

    pub fn deleted(tenant: TenantId, namespace: Namespace, entity_id: impl Into<String>) -> Self {
        Self::new(ChangeKind::Deleted, tenant, namespace, Some(entity_id.into()))
    }

    /// Set the time the change happened at the source.
    pub fn at(mut self, occurred_at: OffsetDateTime) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Resolve the keys this event must evict.
    ///
    /// `updated` and `deleted` evict the entity key and the namespace
    /// wildcard. `created` only evicts the wildcard, since no entity key
    /// existed before the change.
    pub fn resolve(&self) -> Result<EvictionPlan, KeySchemeError> {
        let entity_key = match (self.kind, self.entity_id.as_deref()) {
            (ChangeKind::Created, _) | (_, None) => None,
            (_, Some(id)) => Some(CacheKey::for_entity(&self.tenant, &self.namespace, id)?),
        };
        Ok(EvictionPlan {
            entity_key,
            collection_pattern: KeyPattern::namespace(&self.tenant, &self.namespace),
        })
    }

    pub fn to_message(&self) -> InvalidationMessage {
        InvalidationMessage {
            tenant: self.tenant.to_string(),
            namespace: self.namespace.to_string(),
            entity_id: self.entity_id.clone(),
            kind: self.kind,
            occurred_at: Some(self.occurred_at),
        }
    }
}

/// Keys to remove for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionPlan {
    pub entity_key: Option<CacheKey>,
    pub collection_pattern: KeyPattern,
}

/// Wire format of an invalidation event.
///
/// Fields are unvalidated strings so that a malformed message can be decoded,
/// logged and skipped rather than poisoning the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub tenant: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub kind: ChangeKind,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub occurred_at: Option<OffsetDateTime>,
}

impl InvalidationMessage {
    /// Decode a JSON payload and validate it into an event.
    pub fn decode(payload: &str) -> Result<InvalidationEvent, EventError> {
        let message: InvalidationMessage = serde_json::from_str(payload)?;
        Ok(InvalidationEvent::try_from(message)?)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl TryFrom<InvalidationMessage> for InvalidationEvent {
    type Error = KeySchemeError;

    fn try_from(message: InvalidationMessage) -> Result<Self, Self::Error> {
        let tenant = TenantId::new(message.tenant)?;
        let namespace = Namespace::parse(message.namespace)?;
        let entity_id = message.entity_id.filter(|id| !id.is_empty());
        Ok(Self {
            tenant,
            namespace,
            entity_id,
            kind: message.kind,
            occurred_at: message.occurred_at.unwrap_or_else(OffsetDateTime::now_utc),
        })
    }
}
