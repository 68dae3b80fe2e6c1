//! Fail-soft cache client.
//!
//! Every data-path method bounds the backend call with the operation timeout
//! and absorbs failures: reads become misses, writes and deletes become no-ops.
//! Failures are logged at `warn` and counted, never returned.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tenant_cache_core::{CacheKey, KeyPattern, TenantId};

use super::CacheBackend;
use super::guard::{FillGuard, FillTicket};
use crate::error::CacheError;
use crate::metrics;

/// Point-in-time counters for one client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hits over lookups, or `0.0` before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    evictions: AtomicU64,
}

struct ClientInner {
    backend: Option<Arc<dyn CacheBackend>>,
    timeout: Duration,
    counters: Counters,
    guard: FillGuard,
}

/// Handle to the configured cache store. Cheap to clone.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<ClientInner>,
}

impl CacheClient {
    pub fn new(backend: Arc<dyn CacheBackend>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                backend: Some(backend),
                timeout,
                counters: Counters::default(),
                guard: FillGuard::default(),
            }),
        }
    }

    /// A client on which every call is a no-op miss.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(ClientInner {
                backend: None,
                timeout: Duration::ZERO,
                counters: Counters::default(),
                guard: FillGuard::default(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.backend.is_some()
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner
            .backend
            .as_ref()
            .map_or("disabled", |backend| backend.name())
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            evictions: c.evictions.load(Ordering::Relaxed),
        }
    }

    /// Look up raw bytes. `None` on miss, timeout, or backend failure.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let backend = self.inner.backend.as_ref()?;
        let found = self
            .run("get", key.as_str(), backend.get(key.as_str()))
            .await
            .flatten();
        let counters = &self.inner.counters;
        if found.is_some() {
            counters.hits.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_hit(backend.name());
            tracing::debug!(key = %key, "cache hit");
        } else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_miss(backend.name());
            tracing::debug!(key = %key, "cache miss");
        }
        found
    }

    /// Store raw bytes with a TTL. Failures are absorbed.
    pub async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration) {
        let Some(backend) = self.inner.backend.as_ref() else {
            return;
        };
        if self
            .run("set", key.as_str(), backend.set(key.as_str(), value, ttl))
            .await
            .is_some()
        {
            tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
        }
    }

    /// Take a ticket for a fill. Call before loading the value to store.
    pub fn fill_ticket(&self) -> FillTicket {
        self.inner.guard.ticket()
    }

    /// Store a value loaded after `ticket` was taken, unless an eviction
    /// covering `key` happened since. Returns whether the value was kept.
    ///
    /// An eviction racing the write itself is caught by a second check after
    /// the write, which then removes the entry again.
    pub async fn fill(&self, key: &CacheKey, value: Vec<u8>, ttl: Duration, ticket: FillTicket) -> bool {
        let Some(backend) = self.inner.backend.as_ref() else {
            return false;
        };
        let guard = &self.inner.guard;
        if !guard.is_current(key.as_str(), ticket) {
            tracing::debug!(key = %key, "evicted during load, skipping fill");
            return false;
        }
        self.set(key, value, ttl).await;
        if guard.is_current(key.as_str(), ticket) {
            return true;
        }
        tracing::debug!(key = %key, "evicted during fill, removing");
        self.run("delete", key.as_str(), backend.delete(key.as_str()))
            .await;
        false
    }

    /// Remove one key. Returns whether it existed; `false` on failure.
    pub async fn delete(&self, key: &CacheKey, reason: &'static str) -> bool {
        let Some(backend) = self.inner.backend.as_ref() else {
            return false;
        };
        self.inner.guard.mark(key.as_str());
        let removed = self
            .run("delete", key.as_str(), backend.delete(key.as_str()))
            .await
            .unwrap_or(false);
        if removed {
            self.count_evictions(reason, 1);
        }
        removed
    }

    /// Remove every key under `pattern`. Returns the number removed.
    pub async fn delete_by_pattern(&self, pattern: &KeyPattern, reason: &'static str) -> u64 {
        let Some(backend) = self.inner.backend.as_ref() else {
            return 0;
        };
        self.inner.guard.mark(pattern.prefix());
        let removed = self
            .run(
                "delete_by_pattern",
                pattern.as_str(),
                backend.delete_by_pattern(pattern),
            )
            .await
            .unwrap_or(0);
        self.count_evictions(reason, removed);
        tracing::debug!(pattern = %pattern, removed, reason, "cache pattern eviction");
        removed
    }

    pub async fn exists(&self, key: &CacheKey) -> bool {
        let Some(backend) = self.inner.backend.as_ref() else {
            return false;
        };
        self.run("exists", key.as_str(), backend.exists(key.as_str()))
            .await
            .unwrap_or(false)
    }

    /// Remove every cached key of one tenant, across all namespaces.
    pub async fn purge_tenant(&self, tenant: &TenantId) -> u64 {
        let removed = self
            .delete_by_pattern(&KeyPattern::tenant(tenant), "purge")
            .await;
        tracing::info!(tenant = %tenant, removed, "purged tenant cache");
        removed
    }

    /// Round-trip the backend. Unlike the data path this reports failures,
    /// for health checks.
    pub async fn ping(&self) -> Result<Duration, CacheError> {
        let backend = self.inner.backend.as_ref().ok_or(CacheError::Disabled)?;
        let started = Instant::now();
        tokio::time::timeout(self.inner.timeout, backend.ping())
            .await
            .map_err(|_| CacheError::Timeout(self.inner.timeout))??;
        Ok(started.elapsed())
    }

    fn count_evictions(&self, reason: &'static str, count: u64) {
        self.inner
            .counters
            .evictions
            .fetch_add(count, Ordering::Relaxed);
        metrics::record_evictions(reason, count);
    }

    async fn run<T>(
        &self,
        operation: &'static str,
        key: &str,
        fut: impl Future<Output = Result<T, CacheError>>,
    ) -> Option<T> {
        let outcome = match tokio::time::timeout(self.inner.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.inner.timeout)),
        };
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.inner.counters.errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_error(operation);
                tracing::warn!(operation, key = %key, error = %e, "cache operation failed, continuing without cache");
                None
            }
        }
    }
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.backend_name())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
