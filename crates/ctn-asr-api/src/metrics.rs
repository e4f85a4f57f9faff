//! Prometheus metrics for the HTTP service.
//!
//! Metrics live in a registry owned by [`ServiceMetrics`] rather than the
//! process-global default registry, so tests can build as many instances
//! as they need without duplicate-registration errors.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Metrics collector for the HTTP service.
pub struct ServiceMetrics {
    registry: Registry,

    /// Requests by method, normalized path, and status code
    http_requests_total: IntCounterVec,

    /// Request duration in seconds by method and normalized path
    http_request_duration_seconds: HistogramVec,

    /// Registry lookups by upstream registry
    registry_lookups_total: IntCounterVec,

    /// Lookups rejected by an open or saturated circuit breaker
    breaker_rejections_total: IntCounterVec,
}

impl ServiceMetrics {
    /// Create a metrics collector with its own Prometheus registry.
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("asr_http_requests_total", "HTTP requests processed"),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "asr_http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        let registry_lookups_total = IntCounterVec::new(
            Opts::new(
                "asr_registry_lookups_total",
                "Identifier lookups sent toward external registries",
            ),
            &["registry"],
        )?;
        registry.register(Box::new(registry_lookups_total.clone()))?;

        let breaker_rejections_total = IntCounterVec::new(
            Opts::new(
                "asr_breaker_rejections_total",
                "Lookups rejected by circuit breaker admission control",
            ),
            &["registry"],
        )?;
        registry.register(Box::new(breaker_rejections_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            registry_lookups_total,
            breaker_rejections_total,
        }))
    }

    /// Record one completed HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: Duration) {
        let normalized = normalize_path_for_metrics(path);
        self.http_requests_total
            .with_label_values(&[method, &normalized, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, &normalized])
            .observe(duration.as_secs_f64());
    }

    /// Record a lookup attempt toward an external registry.
    pub fn record_registry_lookup(&self, registry: &str) {
        self.registry_lookups_total
            .with_label_values(&[registry])
            .inc();
    }

    /// Record a lookup rejected by the circuit breaker.
    pub fn record_breaker_rejection(&self, registry: &str) {
        self.breaker_rejections_total
            .with_label_values(&[registry])
            .inc();
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        encoder.encode_to_string(&self.registry.gather())
    }
}

/// Check if a string looks like a UUID with the 8-4-4-4-12 hyphen pattern.
fn is_uuid_like(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }

    s.char_indices().all(|(i, c)| match i {
        8 | 13 | 18 | 23 => c == '-',
        _ => c.is_ascii_hexdigit(),
    })
}

/// Check if a segment looks like an identifier rather than a route word.
///
/// Covers the identifier shapes that appear in ASR paths: numeric IDs
/// (KvK numbers), UUIDs (member IDs), LEIs (20 upper-case alphanumerics),
/// and Peppol participant IDs (`scheme:value`).
fn is_identifier_like(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    if segment.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    if is_uuid_like(segment) {
        return true;
    }

    if segment.len() == 20
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
    {
        return true;
    }

    segment.contains(':')
}

/// Normalize a path for metrics to avoid cardinality explosion.
///
/// Converts paths like `/api/verify/kvk/68750110` to
/// `/api/verify/kvk/:id`.
pub(crate) fn normalize_path_for_metrics(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if is_identifier_like(segment) {
                ":id".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<String>>()
        .join("/")
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
