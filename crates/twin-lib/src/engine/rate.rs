//! Network rate estimation
//!
//! Turns monotonically increasing byte counters into a throughput estimate
//! and infers link capacity from advertised interface speeds.

use super::round_to;
use crate::models::HostMetricsSummary;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// Tags carrying the advertised link speed in Mbps, in priority order
pub const CAPACITY_TAGS: [&str; 3] = [
    "primary_interface_speed_mbps",
    "interface_speed_mbps",
    "link_speed_mbps",
];

const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_GIGABIT: f64 = 1_000_000_000.0;
const MBPS_PER_GBPS: f64 = 1_000.0;

/// Byte counters observed at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CounterReading {
    pub tx: Option<u64>,
    pub rx: Option<u64>,
    pub at: Option<DateTime<Utc>>,
}

impl CounterReading {
    pub fn new(tx: Option<u64>, rx: Option<u64>, at: DateTime<Utc>) -> Self {
        Self { tx, rx, at: Some(at) }
    }
}

/// Estimate combined tx+rx throughput in Gbps between two readings
///
/// Returns `None` when the current reading carries no counters, or when there
/// is no previous timestamp strictly before the current one. A counter that
/// is absent counts as unchanged and a counter that went backwards (reset or
/// wrap) counts as zero, so the result is never negative.
pub fn estimate_throughput_gbps(previous: &CounterReading, current: &CounterReading) -> Option<f64> {
    if current.tx.is_none() && current.rx.is_none() {
        return None;
    }

    let (prev_at, now_at) = (previous.at?, current.at?);
    if now_at <= prev_at {
        return None;
    }

    let elapsed_secs = (now_at - prev_at).num_milliseconds() as f64 / 1000.0;
    if elapsed_secs <= 0.0 {
        return None;
    }

    let delta_tx = counter_delta(previous.tx, current.tx);
    let delta_rx = counter_delta(previous.rx, current.rx);
    let total_bytes = delta_tx + delta_rx;
    if total_bytes == 0 {
        return Some(0.0);
    }

    let gbps = (total_bytes as f64 * BITS_PER_BYTE) / elapsed_secs / BITS_PER_GIGABIT;
    gbps.is_finite().then(|| round_to(gbps, 4))
}

fn counter_delta(previous: Option<u64>, current: Option<u64>) -> u64 {
    match current {
        Some(now) => now.saturating_sub(previous.unwrap_or(now)),
        None => 0,
    }
}

/// Capacity advertised through tags, in Gbps
pub fn capacity_from_tags(tags: &HashMap<String, String>) -> Option<f64> {
    let raw = CAPACITY_TAGS.iter().find_map(|key| tags.get(*key))?;
    let mbps = raw.trim().parse::<f64>().ok()?;
    (mbps.is_finite() && mbps > 0.0).then_some(mbps / MBPS_PER_GBPS)
}

/// Fastest interface not explicitly marked down, in Gbps
///
/// Entries look like `{"name": "eth0", "speed_mbps": 10000, "is_up": true}`;
/// speeds may arrive as numbers or numeric strings.
pub fn capacity_from_interfaces(interfaces: Option<&Value>) -> Option<f64> {
    let entries = interfaces?.as_array()?;

    let best_mbps = entries
        .iter()
        .filter_map(Value::as_object)
        .filter(|entry| match entry.get("is_up") {
            None => true,
            Some(flag) => flag.as_bool() == Some(true),
        })
        .filter_map(|entry| match entry.get("speed_mbps")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|speed| speed.is_finite())
        .fold(0.0_f64, f64::max);

    (best_mbps > 0.0).then_some(best_mbps / MBPS_PER_GBPS)
}

/// Throughput drawn on a hub link
///
/// Uses the measured rate whenever one exists; otherwise defers to
/// [`fallback_throughput_gbps`].
pub fn link_throughput_gbps(metrics: &HostMetricsSummary) -> f64 {
    match metrics.net_throughput_gbps {
        Some(measured) => measured.max(0.0),
        None => fallback_throughput_gbps(metrics),
    }
}

/// Heuristic link throughput for hosts without a measured rate
///
/// Not physically meaningful: cumulative counter bytes stand in for a rate
/// when counters exist, and CPU load stands in when they don't. Kept only so
/// dashboards render a non-empty link.
pub fn fallback_throughput_gbps(metrics: &HostMetricsSummary) -> f64 {
    let base = metrics.net_bytes_tx.or(metrics.net_bytes_rx).unwrap_or(0);
    if base > 0 {
        return ((base as f64 * BITS_PER_BYTE) / BITS_PER_GIGABIT).max(0.01);
    }
    ((metrics.cpu_load / 100.0) * 2.0).max(0.05)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_steady_100_mbps() {
        let prev = CounterReading::new(Some(1_250_000_000), Some(980_000_000), t0());
        let now = CounterReading::new(
            Some(1_250_000_000 + 125_000_000),
            Some(980_000_000),
            t0() + Duration::seconds(10),
        );

        let gbps = estimate_throughput_gbps(&prev, &now).unwrap();
        assert!((gbps - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_no_counters_means_unknown() {
        let prev = CounterReading::new(Some(10), Some(10), t0());
        let now = CounterReading::new(None, None, t0() + Duration::seconds(5));
        assert_eq!(estimate_throughput_gbps(&prev, &now), None);
    }

    #[test]
    fn test_duplicate_or_out_of_order_timestamps() {
        let prev = CounterReading::new(Some(1_000), Some(1_000), t0());
        let same = CounterReading::new(Some(5_000), Some(5_000), t0());
        let earlier = CounterReading::new(Some(5_000), Some(5_000), t0() - Duration::seconds(1));

        assert_eq!(estimate_throughput_gbps(&prev, &same), None);
        assert_eq!(estimate_throughput_gbps(&prev, &earlier), None);
    }

    #[test]
    fn test_missing_previous_timestamp() {
        let prev = CounterReading::default();
        let now = CounterReading::new(Some(5_000), None, t0());
        assert_eq!(estimate_throughput_gbps(&prev, &now), None);
    }

    #[test]
    fn test_counter_reset_never_goes_negative() {
        let cases = [
            (Some(10_000), Some(10_000), Some(0), Some(0)),
            (Some(10_000), Some(0), Some(5), Some(20_000)),
            (None, Some(10), Some(7), Some(3)),
            (Some(u64::MAX), Some(u64::MAX), Some(0), None),
        ];

        for (prev_tx, prev_rx, now_tx, now_rx) in cases {
            let prev = CounterReading::new(prev_tx, prev_rx, t0());
            let now = CounterReading::new(now_tx, now_rx, t0() + Duration::seconds(1));
            let gbps = estimate_throughput_gbps(&prev, &now).unwrap();
            assert!(gbps >= 0.0, "negative rate for {:?}", (prev_tx, prev_rx, now_tx, now_rx));
        }
    }

    #[test]
    fn test_absent_counter_is_unchanged() {
        let prev = CounterReading::new(Some(0), Some(0), t0());
        let now = CounterReading::new(Some(1_000_000_000), None, t0() + Duration::seconds(8));
        assert_eq!(estimate_throughput_gbps(&prev, &now), Some(1.0));
    }

    #[test]
    fn test_rate_rounded_to_four_decimals() {
        let prev = CounterReading::new(Some(0), None, t0());
        let now = CounterReading::new(Some(123_456), None, t0() + Duration::seconds(3));
        // 123456 * 8 / 3 / 1e9 = 0.000329216
        assert_eq!(estimate_throughput_gbps(&prev, &now), Some(0.0003));
    }

    #[test]
    fn test_capacity_tag_priority() {
        let mut tags = HashMap::new();
        tags.insert("link_speed_mbps".to_string(), "1000".to_string());
        assert_eq!(capacity_from_tags(&tags), Some(1.0));

        tags.insert("primary_interface_speed_mbps".to_string(), "25000".to_string());
        assert_eq!(capacity_from_tags(&tags), Some(25.0));
    }

    #[test]
    fn test_capacity_tag_rejects_garbage() {
        let mut tags = HashMap::new();
        tags.insert("interface_speed_mbps".to_string(), "fast".to_string());
        assert_eq!(capacity_from_tags(&tags), None);

        tags.insert("interface_speed_mbps".to_string(), "0".to_string());
        assert_eq!(capacity_from_tags(&tags), None);
    }

    #[test]
    fn test_capacity_from_interfaces_skips_down_links() {
        let interfaces = json!([
            {"name": "eth0", "speed_mbps": 1000, "is_up": true},
            {"name": "eth1", "speed_mbps": 100000, "is_up": false},
            {"name": "eth2", "speed_mbps": "10000"},
            {"name": "lo"},
            "garbage"
        ]);

        assert_eq!(capacity_from_interfaces(Some(&interfaces)), Some(10.0));
    }

    #[test]
    fn test_capacity_from_interfaces_none_when_unusable() {
        assert_eq!(capacity_from_interfaces(None), None);
        assert_eq!(capacity_from_interfaces(Some(&json!({"eth0": 1000}))), None);
        assert_eq!(capacity_from_interfaces(Some(&json!([{"speed_mbps": 0}]))), None);
    }

    #[test]
    fn test_link_throughput_prefers_measured_rate() {
        let metrics = HostMetricsSummary {
            cpu_load: 90.0,
            net_throughput_gbps: Some(0.25),
            ..Default::default()
        };
        assert_eq!(link_throughput_gbps(&metrics), 0.25);
    }

    #[test]
    fn test_fallback_throughput_from_cpu_load() {
        let idle = HostMetricsSummary::default();
        assert_eq!(fallback_throughput_gbps(&idle), 0.05);

        let busy = HostMetricsSummary {
            cpu_load: 50.0,
            ..Default::default()
        };
        assert_eq!(fallback_throughput_gbps(&busy), 1.0);
    }

    #[test]
    fn test_fallback_throughput_from_counters() {
        let metrics = HostMetricsSummary {
            net_bytes_tx: Some(1_250_000_000),
            ..Default::default()
        };
        assert_eq!(fallback_throughput_gbps(&metrics), 10.0);

        let tiny = HostMetricsSummary {
            net_bytes_rx: Some(1),
            ..Default::default()
        };
        assert_eq!(fallback_throughput_gbps(&tiny), 0.01);
    }
}
