//! Twin server - digital twin of a rack-scale host fleet
//!
//! Accepts metric batches from host agents, keeps the twin current and
//! streams snapshots to dashboards.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use twin_lib::{
    alerts::spawn_alert_worker,
    health::{components, HealthRegistry},
    AlertEvaluator, StructuredLogger, SystemClock, TwinEngine, TwinMetrics,
};
use twin_server::{api, config::TwinConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting twin-server");

    let config = TwinConfig::load()?;
    info!(
        api_port = config.api_port,
        hub = %config.hub_hostname,
        refresh_interval_secs = config.refresh_interval_secs,
        host_ttl_secs = config.host_ttl_secs,
        alerts_enabled = config.alerts_enabled,
        "Twin configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ENGINE).await;

    // Register metrics before the first scrape
    TwinMetrics::new();

    let clock = Arc::new(SystemClock);
    let (engine, engine_task) = TwinEngine::spawn(config.engine_config(), clock.clone());

    let alerts = if config.alerts_enabled {
        health_registry.register(components::ALERTS).await;
        let evaluator = Arc::new(AlertEvaluator::new(
            clock,
            StructuredLogger::new(engine.twin_id()),
        ));
        spawn_alert_worker(
            evaluator.clone(),
            engine.subscribe(),
            health_registry.clone(),
        );
        Some(evaluator)
    } else {
        None
    };

    let app_state = Arc::new(api::AppState::new(
        engine,
        alerts,
        health_registry.clone(),
    ));

    health_registry.set_ready(true).await;

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("SIGINT received, shutting down");
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => warn!("API server stopped"),
                Ok(Err(e)) => warn!(error = %e, "API server failed"),
                Err(e) => warn!(error = %e, "API server task panicked"),
            }
        }
    }

    // Dropping the server drops the last engine handles, which stops the actor
    api_handle.abort();
    if tokio::time::timeout(Duration::from_secs(5), engine_task).await.is_err() {
        warn!("Twin engine did not stop in time");
    }
    Ok(())
}
