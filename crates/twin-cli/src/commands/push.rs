//! Upload a batch of samples from a file

use anyhow::{Context, Result};
use std::path::Path;
use twin_lib::{MetricSample, MetricsBatch};

use crate::client::TwinClient;
use crate::output::{print_error, print_json, print_success, print_warning, OutputFormat};

/// Parse a batch file: either `{"samples": [...]}` or a bare array of samples
pub fn parse_batch(content: &str) -> Result<MetricsBatch> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("Batch file is not valid JSON")?;

    if value.is_array() {
        let samples: Vec<MetricSample> =
            serde_json::from_value(value).context("Invalid sample in batch array")?;
        Ok(MetricsBatch { samples })
    } else {
        serde_json::from_value(value).context("Invalid metrics batch")
    }
}

/// Issues found locally, prefixed with the sample index like the server does
pub fn validate_batch(batch: &MetricsBatch) -> Vec<String> {
    batch
        .samples
        .iter()
        .enumerate()
        .flat_map(|(index, sample)| {
            sample
                .validate()
                .into_iter()
                .map(move |issue| format!("samples[{}]: {}", index, issue))
        })
        .collect()
}

/// Push a batch file to the server
pub async fn push_file(client: &TwinClient, path: &Path, format: OutputFormat) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let batch = parse_batch(&content)?;

    if batch.samples.is_empty() {
        anyhow::bail!("{} contains no samples", path.display());
    }

    let issues = validate_batch(&batch);
    if !issues.is_empty() {
        for issue in &issues {
            print_error(issue);
        }
        anyhow::bail!("{} invalid sample field(s), nothing was sent", issues.len());
    }

    let ack = client.push_batch(&batch).await?;

    match format {
        OutputFormat::Json => print_json(&ack)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Pushed {} sample(s), {} accepted",
                batch.samples.len(),
                ack.accepted
            ));
            if ack.dropped > 0 {
                print_warning(&format!("{} sample(s) dropped by the server", ack.dropped));
            }
        }
    }

    Ok(())
}
