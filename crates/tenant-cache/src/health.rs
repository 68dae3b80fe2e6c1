use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::metrics;
use crate::store::{CacheClient, CacheStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheHealthStatus {
    Healthy,
    /// Backend unreachable; requests are served from the repository.
    Degraded,
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheHealth {
    pub status: CacheHealthStatus,
    pub backend: &'static str,
    #[serde(rename = "latencyMs", skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub stats: CacheStats,
    #[serde(rename = "checkedAt", with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

/// Ping the backend and report its state. Also updates the `cache_available` gauge.
pub async fn check_health(client: &CacheClient) -> CacheHealth {
    let checked_at = OffsetDateTime::now_utc();
    if !client.is_enabled() {
        metrics::set_cache_available(false);
        return CacheHealth {
            status: CacheHealthStatus::Disabled,
            backend: client.backend_name(),
            latency_ms: None,
            message: None,
            stats: client.stats(),
            checked_at,
        };
    }

    let (status, latency_ms, message) = match client.ping().await {
        Ok(latency) => (
            CacheHealthStatus::Healthy,
            Some(latency.as_millis() as u64),
            None,
        ),
        Err(e) => {
            tracing::warn!(backend = client.backend_name(), error = %e, "cache health check failed");
            (CacheHealthStatus::Degraded, None, Some(e.to_string()))
        }
    };
    metrics::set_cache_available(status == CacheHealthStatus::Healthy);
    CacheHealth {
        status,
        backend: client.backend_name(),
        latency_ms,
        message,
        stats: client.stats(),
        checked_at,
    }
}
