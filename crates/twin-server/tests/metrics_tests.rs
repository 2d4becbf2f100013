//! Scrape-level checks on twin gauges
//!
//! Kept to a single test: the metrics registry is process-global and this
//! file runs as its own binary.

use axum::{body::Body, http::Request};
use std::sync::Arc;
use tower::ServiceExt;
use twin_lib::{EngineConfig, HealthRegistry, SystemClock, TwinEngine, TwinMetrics};
use twin_server::api::{create_router, AppState};

#[tokio::test]
async fn test_subscriber_gauge_follows_disconnects() {
    let (engine, _task) = TwinEngine::spawn(EngineConfig::default(), Arc::new(SystemClock));
    let state = Arc::new(AppState::new(engine, None, HealthRegistry::new()));
    let app = create_router(state.clone());

    let kept = state.engine.subscribe();
    let gone = state.engine.subscribe().into_stream();
    assert_eq!(TwinMetrics::new().subscribers(), 2);

    drop(gone);
    assert_eq!(TwinMetrics::new().subscribers(), 1);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("twin_snapshot_subscribers 1"));

    drop(kept);
    assert_eq!(TwinMetrics::new().subscribers(), 0);
}
