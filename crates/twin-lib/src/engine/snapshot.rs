//! Snapshot construction
//!
//! Turns the store's host records into an immutable [`TwinState`]. Status,
//! layout and link figures are derived fresh on every build; nothing here
//! keeps state between builds.

use super::identity::format_label;
use super::layout::compute_position;
use super::rate::link_throughput_gbps;
use super::store::HostState;
use super::{round_to, HubConfig};
use crate::models::{
    format_timestamp, HardwareSummary, HostMetricsSummary, HostStatus, HostTwinState, TwinLink,
    TwinPosition, TwinState, TWIN_STATE_TYPE,
};
use chrono::{DateTime, Utc};

/// Below this many milliseconds since last seen a host is online
pub const ONLINE_THRESHOLD_MS: i64 = 15_000;

/// Below this many milliseconds since last seen a host is stale, otherwise offline
pub const OFFLINE_THRESHOLD_MS: i64 = 60_000;

const SYNTHETIC_HUB_AGENT_VERSION: &str = "ego";
const SYNTHETIC_HUB_PLATFORM: &str = "ego-backend";

/// Liveness from elapsed time since last seen
///
/// Negative elapsed time (a last-seen in the future) counts as online.
pub fn resolve_status(elapsed_ms: i64) -> HostStatus {
    if elapsed_ms < ONLINE_THRESHOLD_MS {
        HostStatus::Online
    } else if elapsed_ms < OFFLINE_THRESHOLD_MS {
        HostStatus::Stale
    } else {
        HostStatus::Offline
    }
}

/// Utilization of a hub link, clamped to [0, 1]
///
/// With a positive capacity this is throughput over capacity. Without one it
/// falls back to the larger of CPU load and throughput over 10 Gbps.
pub fn link_utilization(throughput_gbps: f64, capacity_gbps: Option<f64>, cpu_load: f64) -> f64 {
    let ratio = match capacity_gbps.filter(|capacity| *capacity > 0.0) {
        Some(capacity) => throughput_gbps / capacity,
        None => (cpu_load / 100.0).max(throughput_gbps / 10.0),
    };
    ratio.clamp(0.0, 1.0)
}

/// Builds snapshots for one twin instance
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    twin_id: String,
    hub: HubConfig,
}

impl SnapshotBuilder {
    pub fn new(twin_id: impl Into<String>, hub: HubConfig) -> Self {
        Self {
            twin_id: twin_id.into(),
            hub,
        }
    }

    pub fn twin_id(&self) -> &str {
        &self.twin_id
    }

    /// Render every host plus the hub at `now`
    ///
    /// `hosts` may arrive in any order; the output is always hub first, then
    /// the remaining hosts by hostname, with one link per non-hub host.
    pub fn build<'a>(&self, hosts: impl IntoIterator<Item = &'a HostState>, now: DateTime<Utc>) -> TwinState {
        let mut hosts: Vec<&HostState> = hosts.into_iter().collect();
        hosts.sort_by(|a, b| a.hostname.cmp(&b.hostname));

        let hub_index = hosts.iter().position(|host| self.is_hub(host));
        let hub_host = hub_index.map(|index| hosts.remove(index));
        let hub = self.render_hub(hub_host, now);

        let total = hosts.len();
        let mut rendered = Vec::with_capacity(total + 1);
        let mut links = Vec::with_capacity(total);
        rendered.push(hub);

        for (index, host) in hosts.into_iter().enumerate() {
            let status = status_at(host, now);
            let position = host
                .position_override
                .unwrap_or_else(|| compute_position(index, total, status));

            links.push(self.link_to(host));
            rendered.push(render_host(host, status, position));
        }

        TwinState {
            kind: TWIN_STATE_TYPE.to_string(),
            twin_id: self.twin_id.clone(),
            generated_at: format_timestamp(now),
            hosts: rendered,
            links,
        }
    }

    fn is_hub(&self, host: &HostState) -> bool {
        if host.address.to_string() == self.hub.primary_ip.trim() {
            return true;
        }
        let hostname = host.hostname.to_lowercase();
        let hub_hostname = self.hub.hostname.to_lowercase();
        let hub_display = self.hub.display_name.to_lowercase();
        hostname == hub_hostname
            || hostname == hub_display
            || host.display_name.to_lowercase() == hub_display
    }

    fn render_hub(&self, host: Option<&HostState>, now: DateTime<Utc>) -> HostTwinState {
        let display_name = self.hub.display_name.clone();

        match host {
            Some(host) => {
                let ip = host.address.to_string();
                let mut metrics = host.metrics.clone();
                metrics.net_throughput_gbps.get_or_insert(0.0);
                HostTwinState {
                    hostname: self.hub.hostname.clone(),
                    label: format_label(&display_name, &ip, host.rack.as_deref()),
                    display_name,
                    ip,
                    status: status_at(host, now),
                    last_seen: format_timestamp(host.last_seen),
                    agent_version: host.agent_version.clone(),
                    platform: host.platform.clone(),
                    rack: host.rack.clone(),
                    metrics,
                    position: TwinPosition::ORIGIN,
                    hardware: visible_hardware(host.hardware.as_ref()),
                }
            }
            None => {
                let ip = self.hub.primary_ip.clone();
                HostTwinState {
                    hostname: self.hub.hostname.clone(),
                    label: format_label(&display_name, &ip, None),
                    display_name,
                    ip,
                    status: HostStatus::Online,
                    last_seen: format_timestamp(now),
                    agent_version: SYNTHETIC_HUB_AGENT_VERSION.to_string(),
                    platform: SYNTHETIC_HUB_PLATFORM.to_string(),
                    rack: None,
                    metrics: HostMetricsSummary {
                        net_throughput_gbps: Some(0.0),
                        ..Default::default()
                    },
                    position: TwinPosition::ORIGIN,
                    hardware: None,
                }
            }
        }
    }

    fn link_to(&self, host: &HostState) -> TwinLink {
        let throughput = link_throughput_gbps(&host.metrics);
        let capacity = host.metrics.net_capacity_gbps.or(host.capacity_gbps);

        TwinLink {
            id: format!("{}::{}", self.hub.hostname, host.hostname),
            source: self.hub.hostname.clone(),
            target: host.hostname.clone(),
            throughput_gbps: round_to(throughput, 3),
            utilization: round_to(link_utilization(throughput, capacity, host.metrics.cpu_load), 3),
            capacity_gbps: capacity.filter(|c| *c != 0.0).map(|c| round_to(c, 3)),
        }
    }
}

fn status_at(host: &HostState, now: DateTime<Utc>) -> HostStatus {
    resolve_status((now - host.last_seen).num_milliseconds())
}

fn render_host(host: &HostState, status: HostStatus, position: TwinPosition) -> HostTwinState {
    let ip = host.address.to_string();
    HostTwinState {
        hostname: host.hostname.clone(),
        display_name: host.display_name.clone(),
        label: format_label(&host.display_name, &ip, host.rack.as_deref()),
        ip,
        status,
        last_seen: format_timestamp(host.last_seen),
        agent_version: host.agent_version.clone(),
        platform: host.platform.clone(),
        rack: host.rack.clone(),
        metrics: host.metrics.clone(),
        position,
        hardware: visible_hardware(host.hardware.as_ref()),
    }
}

fn visible_hardware(hardware: Option<&HardwareSummary>) -> Option<HardwareSummary> {
    hardware
        .filter(|hardware| **hardware != HardwareSummary::default())
        .cloned()
}
