//! In-process backend on a `DashMap`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tenant_cache_core::KeyPattern;

use super::CacheBackend;
use crate::error::CacheError;

/// A cached entry with TTL support.
///
/// The data is wrapped in `Arc` so hits clone a pointer, not the payload.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub cached_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            cached_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Single-instance backend. Entries expire lazily on read and are swept when
/// the map reaches `max_entries`.
#[derive(Clone, Debug)]
pub struct LocalBackend {
    map: Arc<DashMap<String, CachedEntry>>,
    max_entries: usize,
}

impl LocalBackend {
    pub fn new(max_entries: usize) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn make_room(&self) {
        if self.map.len() < self.max_entries {
            return;
        }
        self.map.retain(|_, entry| !entry.is_expired());
        if self.map.len() < self.max_entries {
            return;
        }
        // Still full: drop the oldest entry.
        let oldest = self
            .map
            .iter()
            .min_by_key(|entry| entry.value().cached_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.map.remove(&key);
            tracing::debug!(key = %key, "local cache full, dropped oldest entry");
        }
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl CacheBackend for LocalBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let hit = match self.map.get(key) {
            Some(entry) if !entry.is_expired() => Some(Arc::clone(&entry.data)),
            Some(entry) => {
                drop(entry);
                self.map.remove(key);
                None
            }
            None => None,
        };
        Ok(hit.map(|data| data.as_ref().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        if !self.map.contains_key(key) {
            self.make_room();
        }
        self.map.insert(key.to_string(), CachedEntry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.map.remove(key).is_some())
    }

    async fn delete_by_pattern(&self, pattern: &KeyPattern) -> Result<u64, CacheError> {
        let mut removed = 0u64;
        self.map.retain(|key, _| {
            if pattern.matches(key) {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.map.get(key).is_some_and(|entry| !entry.is_expired()))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
