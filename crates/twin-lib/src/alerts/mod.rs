//! Threshold alerts over twin snapshots
//!
//! This module provides:
//! - Hysteresis rules for CPU, memory, GPU temperature and link congestion
//! - An in-memory alert book with bounded resolved history
//! - A worker that evaluates every published snapshot

mod evaluator;

pub use evaluator::{AlertEvaluator, DEFAULT_HISTORY_LIMIT};

use crate::engine::SnapshotSubscription;
use crate::health::{components, HealthRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Resolved,
}

/// One alert as exposed over the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub hostname: String,
    pub metric: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold: Option<f64>,
    pub current_value: Option<f64>,
    pub status: AlertStatus,
    pub created_at: String,
    pub updated_at: String,
    pub resolved_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlertError {
    #[error("no active alert with id {0}")]
    NotFound(String),
}

/// Evaluate every snapshot from `subscription` until the publisher goes away
///
/// Runs as an ordinary subscriber, so a slow evaluation only makes this
/// worker skip snapshots; ingestion never waits on it. Once the stream ends
/// the alerts component is reported unhealthy.
pub fn spawn_alert_worker(
    evaluator: Arc<AlertEvaluator>,
    mut subscription: SnapshotSubscription,
    health: HealthRegistry,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting alert evaluation worker");
        while let Some(state) = subscription.next().await {
            evaluator.evaluate_snapshot(&state);
            debug!(
                generated_at = %state.generated_at,
                active = evaluator.active_count(),
                "Evaluated snapshot for alerts"
            );
        }
        warn!(
            lagged = subscription.lagged(),
            "Snapshot stream closed, alert worker exiting"
        );
        health
            .set_unhealthy(components::ALERTS, "snapshot stream closed")
            .await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{SnapshotPublisher, SystemClock};
    use crate::health::ComponentStatus;
    use crate::models::{TwinState, TWIN_STATE_TYPE};
    use crate::observability::StructuredLogger;

    fn empty_state() -> TwinState {
        TwinState {
            kind: TWIN_STATE_TYPE.to_string(),
            twin_id: "twin-test".to_string(),
            generated_at: "2026-01-01T00:00:00.000Z".to_string(),
            hosts: vec![],
            links: vec![],
        }
    }

    #[tokio::test]
    async fn test_worker_reports_unhealthy_when_stream_closes() {
        let health = HealthRegistry::new();
        health.register(components::ALERTS).await;
        let evaluator = Arc::new(AlertEvaluator::new(
            Arc::new(SystemClock),
            StructuredLogger::new("twin-test"),
        ));
        let publisher = SnapshotPublisher::new(empty_state(), 4);

        let worker = spawn_alert_worker(evaluator, publisher.subscribe(), health.clone());
        drop(publisher);
        worker.await.unwrap();

        let report = health.health().await;
        assert_eq!(report.components[components::ALERTS].status, ComponentStatus::Unhealthy);
        assert_eq!(
            report.components[components::ALERTS].message.as_deref(),
            Some("snapshot stream closed")
        );
    }
}
