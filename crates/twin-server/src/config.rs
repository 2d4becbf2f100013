//! Server configuration
//!
//! Read from an optional `twin.{toml,yaml,json}` file, then `TWIN_*`
//! environment variables. Everything has a default, so an empty
//! environment yields a working server.

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;
use std::time::Duration;
use twin_lib::{EngineConfig, HubConfig};

#[derive(Debug, Clone, Deserialize)]
pub struct TwinConfig {
    /// Port for the REST, WebSocket, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_hub_hostname")]
    pub hub_hostname: String,

    #[serde(default = "default_hub_display_name")]
    pub hub_display_name: String,

    #[serde(default = "default_hub_primary_ip")]
    pub hub_primary_ip: String,

    /// Snapshots a WebSocket client may fall behind before skipping
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Seconds between snapshot refreshes without traffic; 0 disables
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Seconds before an idle host is reaped; 0 keeps hosts forever
    #[serde(default)]
    pub host_ttl_secs: u64,

    #[serde(default = "default_alerts_enabled")]
    pub alerts_enabled: bool,
}

fn default_api_port() -> u16 {
    3000
}

fn default_hub_hostname() -> String {
    HubConfig::default().hostname
}

fn default_hub_display_name() -> String {
    HubConfig::default().display_name
}

fn default_hub_primary_ip() -> String {
    HubConfig::default().primary_ip
}

fn default_subscriber_buffer() -> usize {
    16
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_alerts_enabled() -> bool {
    true
}

impl Default for TwinConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            hub_hostname: default_hub_hostname(),
            hub_display_name: default_hub_display_name(),
            hub_primary_ip: default_hub_primary_ip(),
            subscriber_buffer: default_subscriber_buffer(),
            refresh_interval_secs: default_refresh_interval(),
            host_ttl_secs: 0,
            alerts_enabled: default_alerts_enabled(),
        }
    }
}

impl TwinConfig {
    /// Load configuration from the optional config file and the environment
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("twin").required(false))
            .add_source(config::Environment::with_prefix("TWIN").try_parsing(true));
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: Self = builder
            .build()
            .context("failed to read twin configuration")?
            .try_deserialize()
            .context("invalid twin configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that deserialize fine but cannot work
    fn validate(&self) -> Result<()> {
        // Idle hosts are only reaped on refresh ticks
        if self.host_ttl_secs > 0 && self.refresh_interval_secs == 0 {
            anyhow::bail!(
                "host_ttl_secs = {} requires refresh_interval_secs > 0",
                self.host_ttl_secs
            );
        }
        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            hub: HubConfig {
                hostname: self.hub_hostname.clone(),
                display_name: self.hub_display_name.clone(),
                primary_ip: self.hub_primary_ip.clone(),
            },
            subscriber_buffer: self.subscriber_buffer,
            refresh_interval: seconds(self.refresh_interval_secs),
            host_ttl: seconds(self.host_ttl_secs),
            ..Default::default()
        }
    }
}

fn seconds(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}
