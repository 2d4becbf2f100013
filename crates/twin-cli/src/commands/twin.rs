//! Snapshot inspection commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;
use twin_lib::{HostStatus, HostTwinState, TwinLink, TwinState};

use crate::client::TwinClient;
use crate::output::{
    color_status, color_utilization, format_bytes, format_optional, format_timestamp, print_info,
    print_json, print_rows, OutputFormat,
};

/// Row for the hosts table
#[derive(Tabled)]
struct HostRow {
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "Display")]
    display_name: String,
    #[tabled(rename = "IP")]
    ip: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU %")]
    cpu: String,
    #[tabled(rename = "Mem %")]
    memory: String,
    #[tabled(rename = "Net Gbps")]
    throughput: String,
    #[tabled(rename = "Last Seen")]
    last_seen: String,
}

impl From<&HostTwinState> for HostRow {
    fn from(host: &HostTwinState) -> Self {
        Self {
            hostname: host.hostname.clone(),
            display_name: host.display_name.clone(),
            ip: host.ip.clone(),
            status: color_status(&host.status.to_string()),
            cpu: format!("{:.1}", host.metrics.cpu_load),
            memory: format!("{:.1}", host.metrics.memory_used_percent),
            throughput: format_optional(host.metrics.net_throughput_gbps, 3),
            last_seen: format_timestamp(&host.last_seen),
        }
    }
}

/// Row for the links table
#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Throughput Gbps")]
    throughput: String,
    #[tabled(rename = "Capacity Gbps")]
    capacity: String,
    #[tabled(rename = "Utilization")]
    utilization: String,
}

impl From<&TwinLink> for LinkRow {
    fn from(link: &TwinLink) -> Self {
        Self {
            source: link.source.clone(),
            target: link.target.clone(),
            throughput: format!("{:.3}", link.throughput_gbps),
            capacity: format_optional(link.capacity_gbps, 1),
            utilization: color_utilization(link.utilization),
        }
    }
}

/// Count hosts per status, hub excluded
fn status_counts(state: &TwinState) -> (usize, usize, usize) {
    state
        .hosts
        .iter()
        .skip(1)
        .fold((0, 0, 0), |(online, stale, offline), host| match host.status {
            HostStatus::Online => (online + 1, stale, offline),
            HostStatus::Stale => (online, stale + 1, offline),
            HostStatus::Offline => (online, stale, offline + 1),
        })
}

/// Show the latest snapshot
pub async fn show_state(client: &TwinClient, format: OutputFormat) -> Result<()> {
    let state = client.state().await?;

    match format {
        OutputFormat::Json => print_json(&state)?,
        OutputFormat::Table => {
            let (online, stale, offline) = status_counts(&state);
            println!("{}", "Twin State".bold());
            println!("{}", "=".repeat(60));
            println!("Twin:      {}", state.twin_id.cyan());
            println!("Generated: {}", format_timestamp(&state.generated_at));
            println!(
                "Hosts:     {} online, {} stale, {} offline",
                online.to_string().green(),
                stale.to_string().yellow(),
                offline.to_string().red()
            );
            println!();

            let rows: Vec<HostRow> = state.hosts.iter().map(HostRow::from).collect();
            print_rows(rows, "No hosts in the twin");
            println!("\nTotal: {} hosts, {} links", state.hosts.len(), state.links.len());
        }
    }

    Ok(())
}

/// Show a single host in detail
pub async fn show_host(client: &TwinClient, hostname: &str, format: OutputFormat) -> Result<()> {
    let host = client.host(hostname).await?;

    match format {
        OutputFormat::Json => print_json(&host)?,
        OutputFormat::Table => {
            println!("{}", host.display_name.bold());
            println!("{}", "=".repeat(60));
            println!("Hostname:    {}", host.hostname.cyan());
            println!("IP:          {}", host.ip);
            println!("Status:      {}", color_status(&host.status.to_string()));
            println!("Last seen:   {}", format_timestamp(&host.last_seen));
            println!("Agent:       {} ({})", host.agent_version, host.platform);
            if let Some(rack) = &host.rack {
                println!("Rack:        {}", rack);
            }
            println!(
                "Position:    ({:.1}, {:.1}, {:.1})",
                host.position.x, host.position.y, host.position.z
            );

            let metrics = &host.metrics;
            println!("\n{}", "Metrics".bold());
            println!("CPU load:    {:.1}%", metrics.cpu_load);
            println!("Memory:      {:.1}%", metrics.memory_used_percent);
            println!("Load avg:    {:.2}", metrics.load_average);
            println!("Uptime:      {:.0}s", metrics.uptime_seconds);
            if let Some(total) = metrics.memory_total_bytes {
                println!("Mem total:   {}", format_bytes(total));
            }
            if let Some(temp) = metrics.cpu_temperature {
                println!("CPU temp:    {:.1}°C", temp);
            }
            if let Some(temp) = metrics.gpu_temperature {
                println!("GPU temp:    {:.1}°C", temp);
            }
            println!(
                "Network:     {} Gbps of {} Gbps",
                format_optional(metrics.net_throughput_gbps, 3),
                format_optional(metrics.net_capacity_gbps, 1)
            );

            if let Some(hardware) = &host.hardware {
                println!("\n{}", "Hardware".bold());
                let facts = [
                    ("Manufacturer", &hardware.system_manufacturer),
                    ("Model", &hardware.system_model),
                    ("BIOS", &hardware.bios_version),
                    ("CPU", &hardware.cpu_model),
                    ("OS", &hardware.os_distro),
                    ("Release", &hardware.os_release),
                    ("Kernel", &hardware.os_kernel),
                ];
                for (name, value) in facts {
                    if let Some(value) = value {
                        println!("{:<12} {}", format!("{}:", name), value);
                    }
                }
                if let (Some(physical), Some(logical)) =
                    (hardware.cpu_physical_cores, hardware.cpu_logical_cores)
                {
                    println!("{:<12} {} physical / {} logical", "Cores:", physical, logical);
                }
            }
        }
    }

    Ok(())
}

/// Show hub-to-host links
pub async fn show_links(client: &TwinClient, format: OutputFormat) -> Result<()> {
    let state = client.state().await?;

    match format {
        OutputFormat::Json => print_json(&state.links)?,
        OutputFormat::Table => {
            let congested = state
                .links
                .iter()
                .filter(|link| link.utilization >= 0.9)
                .count();
            let rows: Vec<LinkRow> = state.links.iter().map(LinkRow::from).collect();
            print_rows(rows, "No links in the twin");
            if congested > 0 {
                print_info(&format!("{} congested link(s)", congested));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use twin_lib::{HostMetricsSummary, TwinPosition};

    fn host(hostname: &str, status: HostStatus) -> HostTwinState {
        HostTwinState {
            hostname: hostname.to_string(),
            display_name: hostname.to_uppercase(),
            label: hostname.to_string(),
            ip: "10.0.0.10".to_string(),
            status,
            last_seen: "2026-01-01T00:00:00.000Z".to_string(),
            agent_version: "0.1.0".to_string(),
            platform: "Linux".to_string(),
            rack: None,
            metrics: HostMetricsSummary::default(),
            position: TwinPosition::ORIGIN,
            hardware: None,
        }
    }

    #[test]
    fn test_status_counts_skip_hub() {
        let state = TwinState {
            kind: "twin-state".to_string(),
            twin_id: "twin-1".to_string(),
            generated_at: "2026-01-01T00:00:00.000Z".to_string(),
            hosts: vec![
                host("ego-hub", HostStatus::Online),
                host("a", HostStatus::Online),
                host("b", HostStatus::Stale),
                host("c", HostStatus::Offline),
                host("d", HostStatus::Offline),
            ],
            links: vec![],
        };

        assert_eq!(status_counts(&state), (1, 1, 2));
    }

    #[test]
    fn test_host_row_formats_missing_rate() {
        let row = HostRow::from(&host("titan-01", HostStatus::Online));

        assert_eq!(row.throughput, "-");
        assert_eq!(row.cpu, "0.0");
        assert_eq!(row.last_seen, "2026-01-01 00:00:00");
    }

    #[test]
    fn test_link_row_formats_capacity() {
        let link = TwinLink {
            id: "ego-hub::titan-01".to_string(),
            source: "ego-hub".to_string(),
            target: "titan-01".to_string(),
            throughput_gbps: 0.85,
            utilization: 0.425,
            capacity_gbps: None,
        };
        let row = LinkRow::from(&link);

        assert_eq!(row.throughput, "0.850");
        assert_eq!(row.capacity, "-");
        assert!(row.utilization.contains("42.5%"));
    }
}
