//! Host state store
//!
//! Single source of truth for every host the twin has heard from. The store
//! is owned by the engine actor, so `&mut self` on [`HostStateStore::ingest`]
//! is the whole concurrency story: one writer, one host entry per call.

use super::identity::{display_name, IdentityAssigner};
use super::normalizer::NormalizedSample;
use super::rate::{estimate_throughput_gbps, CounterReading};
use crate::models::{HardwareSummary, HostMetricsSummary, TwinPosition};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Mutable per-host record
#[derive(Debug, Clone, PartialEq)]
pub struct HostState {
    pub hostname: String,
    pub display_name: String,
    pub address: Ipv4Addr,
    pub agent_version: String,
    pub platform: String,
    pub rack: Option<String>,
    pub metrics: HostMetricsSummary,
    pub hardware: Option<HardwareSummary>,
    /// Engine clock, not sample clock
    pub last_seen: DateTime<Utc>,
    /// Counters and sample time of the previous sample, for rate estimation
    pub previous_counters: CounterReading,
    pub capacity_gbps: Option<f64>,
    pub position_override: Option<TwinPosition>,
}

/// What an ingest did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Created,
    Updated,
}

/// Map of hostname to latest derived state
#[derive(Debug, Default)]
pub struct HostStateStore {
    hosts: BTreeMap<String, HostState>,
    identity: IdentityAssigner,
}

impl HostStateStore {
    pub fn new(identity: IdentityAssigner) -> Self {
        Self {
            hosts: BTreeMap::new(),
            identity,
        }
    }

    /// Read-modify-write the entry for one sample
    pub fn ingest(&mut self, sample: NormalizedSample, now: DateTime<Utc>) -> StoreChange {
        let address = self.identity.assign(&sample.hostname, sample.address);
        let sampled_at = sample.sampled_at.unwrap_or(now);
        let current = CounterReading::new(
            sample.metrics.net_bytes_tx,
            sample.metrics.net_bytes_rx,
            sampled_at,
        );

        let change = if self.hosts.contains_key(&sample.hostname) {
            StoreChange::Updated
        } else {
            StoreChange::Created
        };

        let state = self
            .hosts
            .entry(sample.hostname.clone())
            .or_insert_with(|| HostState {
                hostname: sample.hostname.clone(),
                display_name: sample.hostname.clone(),
                address,
                agent_version: sample.agent_version.clone(),
                platform: sample.platform.clone(),
                rack: None,
                metrics: HostMetricsSummary::default(),
                hardware: None,
                last_seen: now,
                previous_counters: current,
                capacity_gbps: None,
                position_override: None,
            });

        let throughput = estimate_throughput_gbps(&state.previous_counters, &current)
            .or(state.metrics.net_throughput_gbps);
        let capacity = sample.capacity_gbps.or(state.capacity_gbps);

        let reading = &sample.metrics;
        state.metrics = HostMetricsSummary {
            cpu_load: reading.cpu_load,
            memory_used_percent: reading.memory_used_percent,
            load_average: reading.load_average,
            uptime_seconds: reading.uptime_seconds,
            gpu_temperature: reading.gpu_temperature,
            cpu_temperature: reading.cpu_temperature,
            memory_total_bytes: reading.memory_total_bytes,
            memory_available_bytes: reading.memory_available_bytes,
            net_bytes_tx: reading.net_bytes_tx,
            net_bytes_rx: reading.net_bytes_rx,
            net_throughput_gbps: throughput,
            net_capacity_gbps: capacity,
        };

        state.address = address;
        state.agent_version = sample.agent_version;
        state.platform = sample.platform;
        if sample.rack.is_some() {
            state.rack = sample.rack;
        }
        state.last_seen = now;
        state.capacity_gbps = capacity;
        state.previous_counters = CounterReading {
            tx: current.tx.or(state.previous_counters.tx),
            rx: current.rx.or(state.previous_counters.rx),
            at: Some(sampled_at),
        };
        state
            .hardware
            .get_or_insert_with(HardwareSummary::default)
            .merge_from(&sample.hardware);
        if sample.position.is_some() {
            state.position_override = sample.position;
        }
        state.display_name = display_name(&state.hostname, Some(&state.address.to_string()));

        change
    }

    pub fn get(&self, hostname: &str) -> Option<&HostState> {
        self.hosts.get(hostname)
    }

    /// Every known host, in hostname order
    pub fn all_hosts(&self) -> impl Iterator<Item = &HostState> {
        self.hosts.values()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Drop hosts last seen before `cutoff`; returns the removed hostnames
    ///
    /// Only the TTL reap policy calls this. Address assignments survive, so a
    /// reaped host that returns keeps its identity.
    pub fn reap_idle(&mut self, cutoff: DateTime<Utc>) -> Vec<String> {
        let idle: Vec<String> = self
            .hosts
            .values()
            .filter(|host| host.last_seen < cutoff)
            .map(|host| host.hostname.clone())
            .collect();

        for hostname in &idle {
            self.hosts.remove(hostname);
        }
        idle
    }
}
