//! Sample normalization
//!
//! Coerces an inbound [`MetricSample`] into the canonical record the store
//! consumes. Nothing here fails except an empty hostname, which callers
//! treat as a silent drop.

use super::identity::parse_ipv4;
use super::rate::{capacity_from_interfaces, capacity_from_tags};
use crate::models::{HardwareSummary, MetricSample, TwinPosition};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Reasons a sample is dropped before reaching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("hostname is empty after trimming")]
    EmptyHostname,
}

/// Metric values carried by one sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsReading {
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
}

/// Canonical form of a sample
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSample {
    pub hostname: String,
    /// Sample clock; `None` when the reported timestamp does not parse
    pub sampled_at: Option<DateTime<Utc>>,
    pub metrics: MetricsReading,
    pub address: Option<Ipv4Addr>,
    pub agent_version: String,
    pub platform: String,
    pub rack: Option<String>,
    pub hardware: HardwareSummary,
    pub capacity_gbps: Option<f64>,
    pub position: Option<TwinPosition>,
}

/// Normalize a raw sample
pub fn normalize(sample: &MetricSample) -> Result<NormalizedSample, NormalizeError> {
    let hostname = sample.hostname.trim();
    if hostname.is_empty() {
        return Err(NormalizeError::EmptyHostname);
    }

    let tags = &sample.tags;
    let memory_total_bytes = sample
        .memory_total_bytes
        .or_else(|| tag_integer(tags, "memory_total_bytes"));

    let metrics = MetricsReading {
        cpu_load: finite_or_zero(sample.cpu_load),
        memory_used_percent: finite_or_zero(sample.memory_used_percent),
        load_average: finite_or_zero(sample.load_average),
        uptime_seconds: finite_or_zero(sample.uptime_seconds),
        gpu_temperature: sample.gpu_temperature.filter(|v| v.is_finite()),
        cpu_temperature: sample.cpu_temperature.filter(|v| v.is_finite()),
        memory_total_bytes,
        memory_available_bytes: sample.memory_available_bytes,
        net_bytes_tx: sample.net_bytes_tx,
        net_bytes_rx: sample.net_bytes_rx,
    };

    let hardware = HardwareSummary {
        system_manufacturer: pick_text(&sample.system_manufacturer, tags, "system_manufacturer"),
        system_model: pick_text(&sample.system_model, tags, "system_model"),
        bios_version: pick_text(&sample.bios_version, tags, "bios_version"),
        cpu_model: pick_text(&sample.cpu_model, tags, "cpu_model"),
        cpu_physical_cores: sample
            .cpu_physical_cores
            .or_else(|| tag_integer(tags, "cpu_physical_cores").and_then(|v| u32::try_from(v).ok())),
        cpu_logical_cores: sample
            .cpu_logical_cores
            .or_else(|| tag_integer(tags, "cpu_logical_cores").and_then(|v| u32::try_from(v).ok())),
        memory_total_bytes,
        os_distro: pick_text(&sample.os_distro, tags, "os_distro"),
        os_release: pick_text(&sample.os_release, tags, "os_release"),
        os_kernel: pick_text(&sample.os_kernel, tags, "os_kernel"),
    };

    let address = sample
        .ip
        .as_deref()
        .and_then(parse_ipv4)
        .or_else(|| sample.ipv4.as_deref().and_then(parse_ipv4));

    Ok(NormalizedSample {
        hostname: hostname.to_string(),
        sampled_at: parse_timestamp(&sample.timestamp),
        metrics,
        address,
        agent_version: sample.agent_version.clone(),
        platform: sample.platform.clone(),
        rack: sample.rack.as_deref().map(str::trim).filter(|r| !r.is_empty()).map(String::from),
        hardware,
        capacity_gbps: extract_capacity_gbps(sample),
        position: sample.position.map(TwinPosition::from),
    })
}

/// Capacity priority chain: tags, the explicit top-level field, then interfaces
pub fn extract_capacity_gbps(sample: &MetricSample) -> Option<f64> {
    capacity_from_tags(&sample.tags)
        .or_else(|| {
            sample
                .primary_interface_speed_mbps
                .filter(|mbps| mbps.is_finite() && *mbps > 0.0)
                .map(|mbps| mbps / 1_000.0)
        })
        .or_else(|| capacity_from_interfaces(sample.extra.get("interfaces")))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn pick_text(field: &Option<String>, tags: &HashMap<String, String>, tag: &str) -> Option<String> {
    [field.as_deref(), tags.get(tag).map(String::as_str)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(String::from)
}

fn tag_integer(tags: &HashMap<String, String>, tag: &str) -> Option<u64> {
    let parsed = tags.get(tag)?.trim().parse::<f64>().ok()?;
    (parsed.is_finite() && parsed >= 0.0).then(|| parsed.trunc() as u64)
}
