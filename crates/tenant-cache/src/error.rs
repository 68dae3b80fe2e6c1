//! Error types for the cache layer.
//!
//! [`CacheError`] never escapes [`crate::CacheClient`]'s data-path methods; it
//! is logged and counted there. [`ConfigError`] is fatal at startup.

use std::time::Duration;

use tenant_cache_core::KeySchemeError;

/// Failure talking to a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache pool error: {0}")]
    Pool(String),

    #[error("Cache command error: {0}")]
    Command(String),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cache value serialization error: {0}")]
    Serialization(String),

    #[error("Cache is disabled")]
    Disabled,
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

impl From<deadpool_redis::redis::RedisError> for CacheError {
    fn from(e: deadpool_redis::redis::RedisError) -> Self {
        Self::Command(e.to_string())
    }
}

/// Invalid or unloadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config build error: {0}")]
    Build(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Key scheme violation in configuration: {0}")]
    KeyScheme(#[from] KeySchemeError),
}

impl ConfigError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Failure of the pub/sub event source or publisher.
#[derive(Debug, thiserror::Error)]
pub enum EventSourceError {
    #[error("Redis error: {0}")]
    Redis(#[from] deadpool_redis::redis::RedisError),

    #[error("Redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Event encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Subscription stream closed")]
    StreamClosed,
}

/// Failure of one warming target. Never fatal to startup.
#[derive(Debug, thiserror::Error)]
pub enum WarmingError {
    #[error(transparent)]
    Repository(#[from] tenant_cache_storage::RepositoryError),

    #[error(transparent)]
    KeyScheme(#[from] KeySchemeError),

    #[error("Warm value serialization error: {0}")]
    Serialization(String),

    #[error("Warming load failed: {0}")]
    Load(String),
}

impl From<CacheError> for WarmingError {
    fn from(e: CacheError) -> Self {
        Self::Serialization(e.to_string())
    }
}
