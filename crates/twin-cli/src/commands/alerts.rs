//! Alert commands

use anyhow::Result;
use tabled::Tabled;
use twin_lib::Alert;

use crate::client::TwinClient;
use crate::output::{
    color_status, format_optional, format_timestamp, print_json, print_rows, print_success,
    OutputFormat,
};

/// Row for alerts table
#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Host")]
    hostname: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Since")]
    since: String,
}

impl From<&Alert> for AlertRow {
    fn from(alert: &Alert) -> Self {
        Self {
            id: alert.id.clone(),
            hostname: alert.hostname.clone(),
            metric: alert.metric.clone(),
            severity: color_status(&alert.severity.to_string()),
            value: format_optional(alert.current_value, 2),
            threshold: format_optional(alert.threshold, 2),
            since: format_timestamp(&alert.created_at),
        }
    }
}

/// List active alerts
pub async fn list_alerts(client: &TwinClient, format: OutputFormat) -> Result<()> {
    let alerts = client.active_alerts().await?;

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            let count = alerts.len();
            let rows: Vec<AlertRow> = alerts.iter().map(AlertRow::from).collect();
            print_rows(rows, "No active alerts");
            if count > 0 {
                println!("\nTotal: {} active alerts", count);
            }
        }
    }

    Ok(())
}

/// Resolve an alert by id
pub async fn resolve_alert(client: &TwinClient, id: &str, format: OutputFormat) -> Result<()> {
    let alert = client.resolve_alert(id).await?;

    match format {
        OutputFormat::Json => print_json(&alert)?,
        OutputFormat::Table => {
            print_success(&format!("Alert {} resolved", alert.id));
            println!("Host:    {}", alert.hostname);
            println!("Metric:  {}", alert.metric);
            println!("Message: {}", alert.message);
        }
    }

    Ok(())
}
