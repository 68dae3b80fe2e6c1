//! Cache store: backend trait, backends and the fail-soft client.
//!
//! | Backend | Scope             | Pattern delete          |
//! |---------|-------------------|-------------------------|
//! | Local   | one process       | `retain` over the map   |
//! | Redis   | shared, all nodes | `SCAN MATCH` + `DEL`    |
//!
//! Application code talks to [`CacheClient`], never to a backend directly.

mod client;
mod codec;
mod guard;
mod local;
mod redis;

use std::time::Duration;

use async_trait::async_trait;
use tenant_cache_core::KeyPattern;

use crate::error::CacheError;

pub use self::client::{CacheClient, CacheStats};
pub use self::codec::{decode, encode};
pub use self::guard::FillTicket;
pub use self::local::{CachedEntry, LocalBackend};
pub use self::redis::RedisBackend;

/// Raw key-value operations against one store.
///
/// Implementations report failures; [`CacheClient`] applies timeouts and
/// turns failures into misses.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key matching `pattern`. Returns the number removed.
    async fn delete_by_pattern(&self, pattern: &KeyPattern) -> Result<u64, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    /// Short label for logs and metrics.
    fn name(&self) -> &'static str;
}
