//! Hysteresis evaluation and the alert book
//!
//! Each rule raises at or above its trigger, resolves at or below its clear
//! level and, in between, only refreshes the current value of an alert that
//! is already active. A missing reading resolves the rule's alert.

use super::{Alert, AlertError, AlertSeverity, AlertStatus};
use crate::engine::Clock;
use crate::models::{format_timestamp, HostMetricsSummary, TwinState};
use crate::observability::{StructuredLogger, TwinMetrics};
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

/// Resolved alerts kept before the oldest are evicted
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

const LINK_CONGESTION: &str = "link_congestion";
const CONGESTION_TRIGGER: f64 = 0.9;
const CONGESTION_CLEAR: f64 = 0.7;

struct ThresholdRule {
    metric: &'static str,
    message: &'static str,
    trigger: f64,
    clear: f64,
    reading: fn(&HostMetricsSummary) -> Option<f64>,
}

const THRESHOLD_RULES: [ThresholdRule; 3] = [
    ThresholdRule {
        metric: "cpu_load_high",
        message: "CPU usage high",
        trigger: 80.0,
        clear: 70.0,
        reading: cpu_load,
    },
    ThresholdRule {
        metric: "memory_high",
        message: "Memory usage high",
        trigger: 90.0,
        clear: 80.0,
        reading: memory_used_percent,
    },
    ThresholdRule {
        metric: "gpu_temperature_high",
        message: "GPU temperature high",
        trigger: 80.0,
        clear: 70.0,
        reading: gpu_temperature,
    },
];

fn cpu_load(metrics: &HostMetricsSummary) -> Option<f64> {
    Some(metrics.cpu_load)
}

fn memory_used_percent(metrics: &HostMetricsSummary) -> Option<f64> {
    Some(metrics.memory_used_percent)
}

fn gpu_temperature(metrics: &HostMetricsSummary) -> Option<f64> {
    metrics.gpu_temperature
}

#[derive(Default)]
struct AlertBook {
    /// Oldest first
    active: Vec<Alert>,
    /// Oldest first, bounded
    resolved: VecDeque<Alert>,
}

/// In-memory alert evaluator
pub struct AlertEvaluator {
    book: RwLock<AlertBook>,
    clock: Arc<dyn Clock>,
    history_limit: usize,
    metrics: TwinMetrics,
    logger: StructuredLogger,
}

impl AlertEvaluator {
    pub fn new(clock: Arc<dyn Clock>, logger: StructuredLogger) -> Self {
        Self::with_history_limit(clock, logger, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(
        clock: Arc<dyn Clock>,
        logger: StructuredLogger,
        history_limit: usize,
    ) -> Self {
        Self {
            book: RwLock::new(AlertBook::default()),
            clock,
            history_limit,
            metrics: TwinMetrics::new(),
            logger,
        }
    }

    /// Evaluate every host in a snapshot, hub included
    pub fn evaluate_snapshot(&self, state: &TwinState) {
        for host in &state.hosts {
            self.evaluate_host(&host.hostname, &host.metrics);
        }
    }

    pub fn evaluate_host(&self, hostname: &str, metrics: &HostMetricsSummary) {
        let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);

        for rule in &THRESHOLD_RULES {
            match (rule.reading)(metrics).filter(|value| value.is_finite()) {
                Some(value) if value >= rule.trigger => self.raise(
                    &mut book,
                    hostname,
                    rule.metric,
                    AlertSeverity::Warning,
                    rule.message.to_string(),
                    rule.trigger,
                    value,
                ),
                Some(value) if value > rule.clear => {
                    book.touch(hostname, rule.metric, value, self.now())
                }
                _ => self.resolve_metric(&mut book, hostname, rule.metric),
            }
        }

        self.evaluate_link(&mut book, hostname, metrics);
        self.metrics.set_active_alerts(book.active.len() as i64);
    }

    fn evaluate_link(&self, book: &mut AlertBook, hostname: &str, metrics: &HostMetricsSummary) {
        let capacity = metrics.net_capacity_gbps.filter(|capacity| *capacity > 0.0);
        let (throughput, capacity) = match (metrics.net_throughput_gbps, capacity) {
            (Some(throughput), Some(capacity)) => (throughput, capacity),
            _ => {
                self.resolve_metric(book, hostname, LINK_CONGESTION);
                return;
            }
        };

        let utilization = throughput / capacity;
        if utilization >= CONGESTION_TRIGGER {
            let severity = if utilization >= 1.0 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            let message = format!("Link utilization {}%", (utilization * 100.0).round());
            self.raise(book, hostname, LINK_CONGESTION, severity, message, capacity, throughput);
        } else if utilization <= CONGESTION_CLEAR {
            self.resolve_metric(book, hostname, LINK_CONGESTION);
        } else {
            book.touch(hostname, LINK_CONGESTION, throughput, self.now());
        }
    }

    /// Active alerts, newest first
    pub fn active(&self) -> Vec<Alert> {
        let book = self.book.read().unwrap_or_else(PoisonError::into_inner);
        book.active.iter().rev().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.book
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .len()
    }

    /// Resolved alerts, newest first
    pub fn resolved(&self) -> Vec<Alert> {
        let book = self.book.read().unwrap_or_else(PoisonError::into_inner);
        book.resolved.iter().rev().cloned().collect()
    }

    /// Resolve an active alert by id
    ///
    /// If the condition persists, the next evaluation raises a fresh alert.
    pub fn resolve(&self, id: &str) -> Result<Alert, AlertError> {
        let mut book = self.book.write().unwrap_or_else(PoisonError::into_inner);
        let index = book
            .active
            .iter()
            .position(|alert| alert.id == id)
            .ok_or_else(|| AlertError::NotFound(id.to_string()))?;

        let alert = self.retire(&mut book, index, true);
        self.metrics.set_active_alerts(book.active.len() as i64);
        Ok(alert)
    }

    #[allow(clippy::too_many_arguments)]
    fn raise(
        &self,
        book: &mut AlertBook,
        hostname: &str,
        metric: &str,
        severity: AlertSeverity,
        message: String,
        threshold: f64,
        value: f64,
    ) {
        let now = self.now();
        if let Some(existing) = book.find_mut(hostname, metric) {
            existing.current_value = Some(value);
            existing.message = message;
            existing.updated_at = now;
            return;
        }

        self.logger
            .log_alert_raised(hostname, metric, &severity.to_string(), value, threshold);
        book.active.push(Alert {
            id: Uuid::new_v4().to_string(),
            hostname: hostname.to_string(),
            metric: metric.to_string(),
            severity,
            message,
            threshold: Some(threshold),
            current_value: Some(value),
            status: AlertStatus::Active,
            created_at: now.clone(),
            updated_at: now,
            resolved_at: None,
        });
    }

    fn resolve_metric(&self, book: &mut AlertBook, hostname: &str, metric: &str) {
        if let Some(index) = book.position(hostname, metric) {
            self.retire(book, index, false);
        }
    }

    fn retire(&self, book: &mut AlertBook, index: usize, manual: bool) -> Alert {
        let now = self.now();
        let mut alert = book.active.remove(index);
        alert.status = AlertStatus::Resolved;
        alert.updated_at = now.clone();
        alert.resolved_at = Some(now);
        self.logger
            .log_alert_resolved(&alert.hostname, &alert.metric, manual);

        book.resolved.push_back(alert.clone());
        while book.resolved.len() > self.history_limit {
            book.resolved.pop_front();
        }
        alert
    }

    fn now(&self) -> String {
        format_timestamp(self.clock.now())
    }
}

impl AlertBook {
    fn position(&self, hostname: &str, metric: &str) -> Option<usize> {
        self.active
            .iter()
            .position(|alert| alert.hostname == hostname && alert.metric == metric)
    }

    fn find_mut(&mut self, hostname: &str, metric: &str) -> Option<&mut Alert> {
        self.active
            .iter_mut()
            .find(|alert| alert.hostname == hostname && alert.metric == metric)
    }

    /// Refresh the value of an active alert; no-op when none is active
    fn touch(&mut self, hostname: &str, metric: &str, value: f64, now: String) {
        if let Some(alert) = self.find_mut(hostname, metric) {
            alert.current_value = Some(value);
            alert.updated_at = now;
        }
    }
}
