//! HTTP and WebSocket API for the digital twin

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use twin_lib::{
    format_timestamp,
    health::{components, ComponentStatus, HealthRegistry},
    AlertEvaluator, MetricsBatch, SnapshotSubscription, TwinEngine, TwinMetrics,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: TwinEngine,
    /// `None` when alerting is disabled
    pub alerts: Option<Arc<AlertEvaluator>>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(
        engine: TwinEngine,
        alerts: Option<Arc<AlertEvaluator>>,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            engine,
            alerts,
            health_registry,
        }
    }
}

/// Error body shared by every non-2xx JSON response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub details: Vec<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>, details: Vec<String>) -> Response {
    let body = ErrorBody {
        error: error.into(),
        details,
    };
    (status, Json(body)).into_response()
}

/// Acknowledgement for an accepted batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAccepted {
    pub accepted: usize,
    pub dropped: usize,
    pub received_at: String,
}

async fn health() -> &'static str {
    "ok"
}

/// Health check response - 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.engine.is_running() {
        state
            .health_registry
            .set_unhealthy(components::ENGINE, "engine task has exited")
            .await;
    }
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - 200 if ready, 503 if not
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    // Gauges that mirror live state are refreshed at scrape time
    TwinMetrics::new().set_subscribers(state.engine.subscriber_count() as i64);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Accept a batch of samples
///
/// Every sample is validated before any is ingested, so a rejected request
/// leaves the twin untouched. Bodies that do not decode get the same 400
/// shape as samples that fail validation.
async fn ingest_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MetricsBatch>, JsonRejection>,
) -> Response {
    let batch = match payload {
        Ok(Json(batch)) => batch,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "Rejected undecodable metrics batch");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid metrics batch",
                vec![rejection.body_text()],
            );
        }
    };

    if batch.samples.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "samples must not be empty", vec![]);
    }

    let details: Vec<String> = batch
        .samples
        .iter()
        .enumerate()
        .flat_map(|(index, sample)| {
            sample
                .validate()
                .into_iter()
                .map(move |issue| format!("samples[{}]: {}", index, issue))
        })
        .collect();
    if !details.is_empty() {
        debug!(issues = details.len(), "Rejected invalid metrics batch");
        return error_response(StatusCode::BAD_REQUEST, "invalid metrics batch", details);
    }

    let received_at = format_timestamp(Utc::now());
    match state.engine.ingest_batch(batch.samples).await {
        Ok(report) => (
            StatusCode::ACCEPTED,
            Json(BatchAccepted {
                accepted: report.accepted,
                dropped: report.dropped,
                received_at,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Twin engine unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string(), vec![])
        }
    }
}

async fn twin_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.latest().as_ref().clone())
}

async fn twin_host(State(state): State<Arc<AppState>>, Path(hostname): Path<String>) -> Response {
    match state.engine.host(&hostname) {
        Some(host) => Json(host).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("host {} not found", hostname),
            vec![],
        ),
    }
}

async fn twin_stream(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let subscription = state.engine.subscribe();
    ws.on_upgrade(move |socket| stream_snapshots(socket, subscription))
}

/// Push the current snapshot, then every new one, until either side goes away
async fn stream_snapshots(mut socket: WebSocket, mut subscription: SnapshotSubscription) {
    info!("Twin stream client connected");

    loop {
        tokio::select! {
            next = subscription.next() => {
                let Some(snapshot) = next else { break };
                let text = match serde_json::to_string(snapshot.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize snapshot");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!(lagged = subscription.lagged(), "Twin stream client disconnected");
}

async fn active_alerts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let alerts = state
        .alerts
        .as_ref()
        .map(|evaluator| evaluator.active())
        .unwrap_or_default();
    Json(alerts)
}

async fn resolve_alert(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(evaluator) = state.alerts.as_ref() else {
        return error_response(StatusCode::NOT_FOUND, "alerting is disabled", vec![]);
    };

    match evaluator.resolve(&id) {
        Ok(alert) => Json(alert).into_response(),
        Err(e) => error_response(StatusCode::NOT_FOUND, e.to_string(), vec![]),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/health", get(health))
        .route("/api/metrics/batch", post(ingest_batch))
        .route("/api/twin/state", get(twin_state))
        .route("/api/twin/hosts/:hostname", get(twin_host))
        .route("/api/twin/stream", get(twin_stream))
        .route("/api/alerts/active", get(active_alerts))
        .route("/api/alerts/:id/resolve", post(resolve_alert))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting twin API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
