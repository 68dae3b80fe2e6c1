//! Prometheus metrics for the cache layer.
//!
//! Counters are emitted through the `metrics` facade, so they are no-ops until
//! a recorder is installed. [`init_metrics`] installs a Prometheus recorder for
//! hosts that do not bring their own.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global Prometheus handle for rendering metrics; `None` when another
/// recorder was already installed.
static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "cache_evictions_total";
    pub const CACHE_AVAILABLE: &str = "cache_available";

    pub const CACHE_INVALIDATION_EVENTS_TOTAL: &str = "cache_invalidation_events_total";
    pub const CACHE_WARMING_TARGETS_TOTAL: &str = "cache_warming_targets_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if this call installed the recorder, `false` if already
/// initialized or another recorder is installed.
pub fn init_metrics() -> bool {
    let mut installed = false;
    PROMETHEUS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            tracing::info!("Prometheus metrics initialized");
            installed = true;
            Some(handle)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    });
    if !installed {
        tracing::debug!("Prometheus metrics already initialized");
    }
    installed
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE
        .get()
        .and_then(Option::as_ref)
        .map(|handle| handle.render())
}

pub fn record_cache_hit(backend: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "backend" => backend).increment(1);
}

pub fn record_cache_miss(backend: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "backend" => backend).increment(1);
}

/// Record an absorbed backend failure.
pub fn record_cache_error(operation: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

/// Record removed keys. `reason` is one of `write`, `delete`, `event`, `corrupt`, `purge`.
pub fn record_evictions(reason: &'static str, count: u64) {
    if count > 0 {
        counter!(names::CACHE_EVICTIONS_TOTAL, "reason" => reason).increment(count);
    }
}

pub fn set_cache_available(available: bool) {
    gauge!(names::CACHE_AVAILABLE).set(if available { 1.0 } else { 0.0 });
}

/// Record a consumed invalidation event by outcome (`evicted`, `skipped`).
pub fn record_invalidation_event(outcome: &'static str) {
    counter!(names::CACHE_INVALIDATION_EVENTS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a warming target by outcome (`warmed`, `failed`, `timed_out`, `panicked`).
pub fn record_warming_target(outcome: &'static str) {
    counter!(names::CACHE_WARMING_TARGETS_TOTAL, "outcome" => outcome).increment(1);
}
