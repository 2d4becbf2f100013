//! Observability infrastructure for the twin engine
//!
//! Provides:
//! - Prometheus metrics (ingestion counters, snapshot latency, fan-out, alerts)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for snapshot build latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<TwinMetricsInner> = OnceLock::new();

struct TwinMetricsInner {
    samples_ingested: IntCounter,
    samples_dropped: IntCounter,
    hosts_tracked: IntGauge,
    snapshot_build_seconds: Histogram,
    snapshots_published: IntCounter,
    subscribers: IntGauge,
    snapshots_lagged: IntCounter,
    active_alerts: IntGauge,
}

impl TwinMetricsInner {
    fn new() -> Self {
        Self {
            samples_ingested: register_int_counter!(
                "twin_samples_ingested_total",
                "Samples applied to the host state store"
            )
            .expect("Failed to register samples_ingested"),

            samples_dropped: register_int_counter!(
                "twin_samples_dropped_total",
                "Samples dropped during normalization"
            )
            .expect("Failed to register samples_dropped"),

            hosts_tracked: register_int_gauge!(
                "twin_hosts_tracked",
                "Hosts currently held in the state store"
            )
            .expect("Failed to register hosts_tracked"),

            snapshot_build_seconds: register_histogram!(
                "twin_snapshot_build_seconds",
                "Time spent rebuilding a twin snapshot",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register snapshot_build_seconds"),

            snapshots_published: register_int_counter!(
                "twin_snapshots_published_total",
                "Snapshots handed to the publisher"
            )
            .expect("Failed to register snapshots_published"),

            subscribers: register_int_gauge!(
                "twin_snapshot_subscribers",
                "Live snapshot subscriptions"
            )
            .expect("Failed to register subscribers"),

            snapshots_lagged: register_int_counter!(
                "twin_snapshots_lagged_total",
                "Snapshots skipped by subscribers that fell behind"
            )
            .expect("Failed to register snapshots_lagged"),

            active_alerts: register_int_gauge!(
                "twin_active_alerts",
                "Alerts currently active"
            )
            .expect("Failed to register active_alerts"),
        }
    }
}

/// Twin metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Debug, Clone)]
pub struct TwinMetrics {
    _private: (),
}

impl Default for TwinMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TwinMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(TwinMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &TwinMetricsInner {
        GLOBAL_METRICS.get_or_init(TwinMetricsInner::new)
    }

    pub fn inc_samples_ingested(&self) {
        self.inner().samples_ingested.inc();
    }

    pub fn inc_samples_dropped(&self) {
        self.inner().samples_dropped.inc();
    }

    pub fn set_hosts_tracked(&self, count: i64) {
        self.inner().hosts_tracked.set(count);
    }

    /// Record one snapshot rebuild
    pub fn observe_snapshot_build(&self, duration_secs: f64) {
        self.inner().snapshot_build_seconds.observe(duration_secs);
    }

    pub fn inc_snapshots_published(&self) {
        self.inner().snapshots_published.inc();
    }

    pub fn set_subscribers(&self, count: i64) {
        self.inner().subscribers.set(count);
    }

    pub fn inc_snapshots_lagged(&self, skipped: u64) {
        self.inner().snapshots_lagged.inc_by(skipped);
    }

    pub fn set_active_alerts(&self, count: i64) {
        self.inner().active_alerts.set(count);
    }

    pub fn samples_ingested(&self) -> u64 {
        self.inner().samples_ingested.get()
    }

    pub fn samples_dropped(&self) -> u64 {
        self.inner().samples_dropped.get()
    }

    pub fn subscribers(&self) -> i64 {
        self.inner().subscribers.get()
    }
}

/// Structured logger for twin events
///
/// Keeps event names and field sets consistent across the engine and the
/// alert evaluator.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    twin_id: String,
}

impl StructuredLogger {
    pub fn new(twin_id: impl Into<String>) -> Self {
        Self {
            twin_id: twin_id.into(),
        }
    }

    pub fn log_startup(&self, hub_hostname: &str) {
        info!(
            event = "twin_started",
            twin_id = %self.twin_id,
            hub = %hub_hostname,
            "Digital twin engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "twin_shutdown",
            twin_id = %self.twin_id,
            reason = %reason,
            "Digital twin engine shutting down"
        );
    }

    /// First sample from a hostname the store has not seen
    pub fn log_host_discovered(&self, hostname: &str, address: &str, hosts_tracked: usize) {
        info!(
            event = "host_discovered",
            twin_id = %self.twin_id,
            hostname = %hostname,
            ip = %address,
            hosts_tracked = hosts_tracked,
            "New host joined the twin"
        );
    }

    pub fn log_sample_dropped(&self, hostname: &str, reason: &str) {
        warn!(
            event = "sample_dropped",
            twin_id = %self.twin_id,
            hostname = ?hostname,
            reason = %reason,
            "Dropped metric sample"
        );
    }

    pub fn log_hosts_reaped(&self, hostnames: &[String], ttl_secs: i64) {
        info!(
            event = "hosts_reaped",
            twin_id = %self.twin_id,
            count = hostnames.len(),
            hostnames = ?hostnames,
            ttl_secs = ttl_secs,
            "Removed idle hosts"
        );
    }

    pub fn log_alert_raised(
        &self,
        hostname: &str,
        metric: &str,
        severity: &str,
        current_value: f64,
        threshold: f64,
    ) {
        match severity {
            "critical" => {
                warn!(
                    event = "alert_raised",
                    twin_id = %self.twin_id,
                    hostname = %hostname,
                    metric = %metric,
                    severity = %severity,
                    current_value = current_value,
                    threshold = threshold,
                    "Critical alert raised"
                );
            }
            _ => {
                info!(
                    event = "alert_raised",
                    twin_id = %self.twin_id,
                    hostname = %hostname,
                    metric = %metric,
                    severity = %severity,
                    current_value = current_value,
                    threshold = threshold,
                    "Alert raised"
                );
            }
        }
    }

    pub fn log_alert_resolved(&self, hostname: &str, metric: &str, manual: bool) {
        info!(
            event = "alert_resolved",
            twin_id = %self.twin_id,
            hostname = %hostname,
            metric = %metric,
            manual = manual,
            "Alert resolved"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twin_metrics_creation() {
        // Handles share the global registry, so only relative changes are checked
        let metrics = TwinMetrics::new();
        let ingested = metrics.samples_ingested();

        metrics.inc_samples_ingested();
        metrics.observe_snapshot_build(0.0004);
        metrics.set_hosts_tracked(3);
        metrics.inc_snapshots_lagged(2);
        metrics.set_active_alerts(1);

        assert!(TwinMetrics::new().samples_ingested() > ingested);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("twin-abc");
        assert_eq!(logger.twin_id, "twin-abc");
    }
}
