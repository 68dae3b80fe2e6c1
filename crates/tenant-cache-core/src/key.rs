//! Key scheme.
//!
//! Keys are built from ordered segments joined by [`SEPARATOR`]:
//! scope, scope id (tenant keys only), namespace, and a tail. Entity ids and
//! query parameters are percent-encoded, so the tail never contains a raw
//! separator or glob metacharacter. Collection tails always contain `=` while
//! encoded entity ids never do, which keeps the two key families disjoint.

use std::fmt;

use crate::error::KeySchemeError;
use crate::query::CollectionQuery;
use crate::tenant::{Namespace, TenantId};

/// Segment separator. Not permitted inside tenant ids or namespace segments.
pub const SEPARATOR: char = ':';

const TENANT_SCOPE: &str = "tenant";
const GLOBAL_SCOPE: &str = "global";
const WILDCARD: char = '*';
/// Tail used for a collection query with no parameters.
const EMPTY_QUERY_TAIL: &str = "=";

/// Whether a key is isolated to one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    Tenant,
    Global,
}

impl KeyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScope::Tenant => TENANT_SCOPE,
            KeyScope::Global => GLOBAL_SCOPE,
        }
    }
}

/// A fully built cache key.
///
/// Can only be obtained through the constructors below, so every key in the
/// system follows the same layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for a single entity: `tenant:{tenant}:{namespace}:{id}`.
    pub fn for_entity(
        tenant: &TenantId,
        namespace: &Namespace,
        id: &str,
    ) -> Result<Self, KeySchemeError> {
        if id.is_empty() {
            return Err(KeySchemeError::EmptyIdentifier);
        }
        let mut key = tenant_prefix(tenant, namespace);
        key.push_str(&urlencoding::encode(id));
        Ok(Self(key))
    }

    /// Key for a collection query: `tenant:{tenant}:{namespace}:{canonical query}`.
    pub fn for_collection(tenant: &TenantId, namespace: &Namespace, query: &CollectionQuery) -> Self {
        let mut key = tenant_prefix(tenant, namespace);
        if query.is_empty() {
            key.push_str(EMPTY_QUERY_TAIL);
        } else {
            key.push_str(&query.canonical());
        }
        Self(key)
    }

    /// Cross-tenant key: `global:{namespace}:{key}`.
    ///
    /// Provides no tenant isolation. Callers must gate this path behind their
    /// own administrative authorization.
    pub fn for_global(namespace: &Namespace, key: &str) -> Result<Self, KeySchemeError> {
        if key.is_empty() {
            return Err(KeySchemeError::EmptyIdentifier);
        }
        Ok(Self(format!(
            "{GLOBAL_SCOPE}{SEPARATOR}{namespace}{SEPARATOR}{}",
            urlencoding::encode(key)
        )))
    }

    pub fn scope(&self) -> KeyScope {
        if self.0.starts_with(GLOBAL_SCOPE) {
            KeyScope::Global
        } else {
            KeyScope::Tenant
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A trailing-wildcard pattern for bulk eviction, e.g. `tenant:acme:users:*`.
///
/// Only the final `*` is a metacharacter; everything before it is a literal
/// prefix, which is what both the Redis `SCAN MATCH` and the local backend
/// rely on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPattern(String);

impl KeyPattern {
    /// Every key under a tenant and namespace.
    pub fn namespace(tenant: &TenantId, namespace: &Namespace) -> Self {
        let mut pattern = tenant_prefix(tenant, namespace);
        pattern.push(WILDCARD);
        Self(pattern)
    }

    /// Every key belonging to a tenant, across namespaces.
    pub fn tenant(tenant: &TenantId) -> Self {
        Self(format!("{TENANT_SCOPE}{SEPARATOR}{tenant}{SEPARATOR}{WILDCARD}"))
    }

    /// Every global key under a namespace.
    pub fn global(namespace: &Namespace) -> Self {
        Self(format!("{GLOBAL_SCOPE}{SEPARATOR}{namespace}{SEPARATOR}{WILDCARD}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The literal part of the pattern.
    pub fn prefix(&self) -> &str {
        self.0.strip_suffix(WILDCARD).unwrap_or(&self.0)
    }

    pub fn matches(&self, key: &str) -> bool {
        key.starts_with(self.prefix())
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn tenant_prefix(tenant: &TenantId, namespace: &Namespace) -> String {
    format!("{TENANT_SCOPE}{SEPARATOR}{tenant}{SEPARATOR}{namespace}{SEPARATOR}")
}
