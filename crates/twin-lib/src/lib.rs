//! Digital twin library for rack-scale host telemetry
//!
//! This crate provides the core functionality for:
//! - Normalizing host metric samples and estimating network rates
//! - Maintaining per-host state behind a single-writer engine
//! - Building and broadcasting immutable twin snapshots
//! - Threshold alerts over published snapshots
//! - Health checks and observability

pub mod alerts;
pub mod engine;
pub mod health;
pub mod models;
pub mod observability;

pub use alerts::{Alert, AlertError, AlertEvaluator, AlertSeverity, AlertStatus};
pub use engine::{
    Clock, EngineConfig, HubConfig, IngestOutcome, IngestReport, ManualClock,
    SnapshotSubscription, SystemClock, TwinEngine, TwinError,
};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, TwinMetrics};
