//! Core data models for the digital twin
//!
//! Inbound samples are snake_case as the reporting agents send them; every
//! outbound type is camelCase because dashboards consume it verbatim.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Type tag carried by every snapshot
pub const TWIN_STATE_TYPE: &str = "twin-state";

/// Telemetry sample reported by a host agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSample {
    pub hostname: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub cpu_load: f64,
    #[serde(default)]
    pub memory_used_percent: f64,
    #[serde(default)]
    pub load_average: f64,
    #[serde(default)]
    pub uptime_seconds: f64,
    #[serde(default)]
    pub agent_version: String,
    #[serde(default)]
    pub platform: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_total_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_available_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_bytes_tx: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_bytes_rx: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bios_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_physical_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_logical_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_distro: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_kernel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_interface_speed_mbps: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<PositionInput>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,

    /// Fields the engine does not model (e.g. `interfaces`), kept for capacity inference
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MetricSample {
    /// Transport-side validation; returns one message per violated constraint
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.hostname.is_empty() {
            issues.push("hostname must not be empty".to_string());
        }
        if DateTime::parse_from_rfc3339(self.timestamp.trim()).is_err() {
            issues.push(format!("timestamp '{}' is not a valid ISO-8601 timestamp", self.timestamp));
        }
        if !(self.cpu_load.is_finite() && self.cpu_load >= 0.0) {
            issues.push("cpu_load must be >= 0".to_string());
        }
        if !(0.0..=100.0).contains(&self.memory_used_percent) {
            issues.push("memory_used_percent must be within [0, 100]".to_string());
        }
        if !self.load_average.is_finite() {
            issues.push("load_average must be a finite number".to_string());
        }
        if !(self.uptime_seconds.is_finite() && self.uptime_seconds >= 0.0) {
            issues.push("uptime_seconds must be >= 0".to_string());
        }
        if self.agent_version.is_empty() {
            issues.push("agent_version must not be empty".to_string());
        }
        if self.platform.is_empty() {
            issues.push("platform must not be empty".to_string());
        }
        for (field, value) in [("ip", &self.ip), ("ipv4", &self.ipv4)] {
            if let Some(candidate) = value {
                if candidate.parse::<Ipv4Addr>().is_err() {
                    issues.push(format!("{} '{}' is not a valid IPv4 address", field, candidate));
                }
            }
        }

        issues
    }
}

/// Explicit layout override supplied by a sample; missing axes default to 0
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionInput {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

/// Batch upload body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsBatch {
    #[serde(default)]
    pub samples: Vec<MetricSample>,
}

/// Liveness classification derived from staleness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Stale,
    Offline,
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostStatus::Online => write!(f, "online"),
            HostStatus::Stale => write!(f, "stale"),
            HostStatus::Offline => write!(f, "offline"),
        }
    }
}

/// 3D position in the twin scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TwinPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl TwinPosition {
    pub const ORIGIN: TwinPosition = TwinPosition { x: 0.0, y: 0.0, z: 0.0 };
}

impl From<PositionInput> for TwinPosition {
    fn from(input: PositionInput) -> Self {
        Self {
            x: input.x,
            y: input.y,
            z: input.z,
        }
    }
}

/// Per-host metrics as rendered in a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMetricsSummary {
    pub cpu_load: f64,
    pub memory_used_percent: f64,
    pub load_average: f64,
    pub uptime_seconds: f64,
    pub gpu_temperature: Option<f64>,
    pub cpu_temperature: Option<f64>,
    pub memory_total_bytes: Option<u64>,
    pub memory_available_bytes: Option<u64>,
    pub net_bytes_tx: Option<u64>,
    pub net_bytes_rx: Option<u64>,
    pub net_throughput_gbps: Option<f64>,
    pub net_capacity_gbps: Option<f64>,
}

/// Hardware facts, accumulated across samples
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSummary {
    pub system_manufacturer: Option<String>,
    pub system_model: Option<String>,
    pub bios_version: Option<String>,
    pub cpu_model: Option<String>,
    pub cpu_physical_cores: Option<u32>,
    pub cpu_logical_cores: Option<u32>,
    pub memory_total_bytes: Option<u64>,
    pub os_distro: Option<String>,
    pub os_release: Option<String>,
    pub os_kernel: Option<String>,
}

impl HardwareSummary {
    /// Overwrite a field only when the incoming value is present and non-empty
    pub fn merge_from(&mut self, incoming: &HardwareSummary) {
        merge_text(&mut self.system_manufacturer, &incoming.system_manufacturer);
        merge_text(&mut self.system_model, &incoming.system_model);
        merge_text(&mut self.bios_version, &incoming.bios_version);
        merge_text(&mut self.cpu_model, &incoming.cpu_model);
        merge_value(&mut self.cpu_physical_cores, incoming.cpu_physical_cores);
        merge_value(&mut self.cpu_logical_cores, incoming.cpu_logical_cores);
        merge_value(&mut self.memory_total_bytes, incoming.memory_total_bytes);
        merge_text(&mut self.os_distro, &incoming.os_distro);
        merge_text(&mut self.os_release, &incoming.os_release);
        merge_text(&mut self.os_kernel, &incoming.os_kernel);
    }
}

fn merge_text(target: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming {
        if !value.trim().is_empty() {
            *target = Some(value.clone());
        }
    }
}

fn merge_value<T: Copy>(target: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *target = incoming;
    }
}

/// One host as rendered in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTwinState {
    pub hostname: String,
    pub display_name: String,
    pub label: String,
    pub ip: String,
    pub status: HostStatus,
    pub last_seen: String,
    pub agent_version: String,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<String>,
    pub metrics: HostMetricsSummary,
    pub position: TwinPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardware: Option<HardwareSummary>,
}

/// Hub-to-host network link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinLink {
    pub id: String,
    pub source: String,
    pub target: String,
    pub throughput_gbps: f64,
    pub utilization: f64,
    pub capacity_gbps: Option<f64>,
}

/// Immutable, versioned view of the whole fleet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwinState {
    #[serde(rename = "type")]
    pub kind: String,
    pub twin_id: String,
    pub generated_at: String,
    pub hosts: Vec<HostTwinState>,
    pub links: Vec<TwinLink>,
}

impl TwinState {
    /// Find a host by hostname
    pub fn host(&self, hostname: &str) -> Option<&HostTwinState> {
        self.hosts.iter().find(|host| host.hostname == hostname)
    }

    /// The hub is always rendered first
    pub fn hub(&self) -> Option<&HostTwinState> {
        self.hosts.first()
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
