//! Core types for the tenant-aware caching layer.
//!
//! This crate is pure: it performs no I/O and holds no global state. It defines
//! how cache keys are built, how bulk-eviction patterns are derived from them,
//! and what an invalidation event looks like on the wire.
//!
//! # Key layout
//!
//! ```text
//! tenant:{tenant_id}:{namespace}:{entity_id}          entity lookup
//! tenant:{tenant_id}:{namespace}:{name=value&...}     collection query
//! tenant:{tenant_id}:{namespace}:*                    namespace wildcard
//! global:{namespace}:{key}                            cross-tenant admin data
//! ```
//!
//! The wildcard produced by [`KeyPattern::namespace`] is, by construction, a
//! prefix of every key produced by [`CacheKey::for_entity`] and
//! [`CacheKey::for_collection`] for the same tenant and namespace.

pub mod error;
pub mod events;
pub mod key;
pub mod query;
pub mod tenant;

pub use error::{EventError, KeySchemeError};
pub use events::{ChangeKind, EvictionPlan, InvalidationEvent, InvalidationMessage};
pub use key::{CacheKey, KeyPattern, KeyScope, SEPARATOR};
pub use query::CollectionQuery;
pub use tenant::{MAX_TENANT_ID_LEN, Namespace, TenantId};
