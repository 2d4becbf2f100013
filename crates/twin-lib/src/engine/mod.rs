//! Digital twin state engine
//!
//! A single actor task owns the host store and the identity caches. Callers
//! talk to it through a cloneable [`TwinEngine`] handle; reads go straight to
//! the [`SnapshotPublisher`] and never wait on the actor.

pub mod identity;
pub mod layout;
pub mod normalizer;
pub mod publisher;
pub mod rate;
pub mod snapshot;
pub mod store;


pub use identity::{display_name, format_label, parse_ipv4, IdentityAssigner};
pub use layout::compute_position;
pub use normalizer::{normalize, NormalizeError, NormalizedSample};
pub use publisher::{SnapshotPublisher, SnapshotSubscription};
pub use rate::{estimate_throughput_gbps, fallback_throughput_gbps, CounterReading};
pub use snapshot::{link_utilization, resolve_status, SnapshotBuilder};
pub use store::{HostState, HostStateStore, StoreChange};

use crate::models::{HostTwinState, MetricSample, TwinState};
use crate::observability::{StructuredLogger, TwinMetrics};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Round to a fixed number of decimal places
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

/// Identity of the hub node, injected by whoever loads configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub hostname: String,
    pub display_name: String,
    /// Address used to recognise the hub and shown when no real host matches
    pub primary_ip: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hostname: "ego-hub".to_string(),
            display_name: "MIRROR STAGE EGO".to_string(),
            primary_ip: "10.0.0.100".to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub hub: HubConfig,
    /// Snapshots a subscriber may fall behind before it starts skipping
    pub subscriber_buffer: usize,
    /// Pending commands before `ingest` callers wait for room
    pub command_buffer: usize,
    /// Rebuild and publish periodically so statuses age without traffic
    pub refresh_interval: Option<Duration>,
    /// Reap hosts not seen for this long; `None` keeps every host forever
    pub host_ttl: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            subscriber_buffer: 16,
            command_buffer: 1024,
            refresh_interval: None,
            host_ttl: None,
        }
    }
}

/// Source of "now" for the engine
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Errors surfaced by the engine handle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TwinError {
    #[error("twin engine has stopped")]
    EngineStopped,
}

/// Result of ingesting one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted { hostname: String },
    Dropped(NormalizeError),
}

impl IngestOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, IngestOutcome::Accepted { .. })
    }
}

/// Tally for a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub dropped: usize,
}

enum Command {
    Ingest {
        sample: MetricSample,
        reply: Option<oneshot::Sender<IngestOutcome>>,
    },
    Refresh {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running twin engine
#[derive(Debug, Clone)]
pub struct TwinEngine {
    commands: mpsc::Sender<Command>,
    publisher: Arc<SnapshotPublisher>,
    twin_id: Arc<str>,
}

impl TwinEngine {
    /// Start the actor on the current tokio runtime
    ///
    /// The task ends once every handle is dropped.
    pub fn spawn(config: EngineConfig, clock: Arc<dyn Clock>) -> (Self, JoinHandle<()>) {
        let twin_id = generate_twin_id();
        let reserved = parse_ipv4(&config.hub.primary_ip);
        let builder = SnapshotBuilder::new(twin_id.clone(), config.hub.clone());
        let initial = builder.build(std::iter::empty(), clock.now());
        let publisher = Arc::new(SnapshotPublisher::new(initial, config.subscriber_buffer));
        let (commands, inbox) = mpsc::channel(config.command_buffer.max(1));

        let logger = StructuredLogger::new(twin_id.clone());
        logger.log_startup(&config.hub.hostname);

        let actor = EngineActor {
            store: HostStateStore::new(IdentityAssigner::new(reserved)),
            builder,
            publisher: publisher.clone(),
            clock,
            host_ttl: config.host_ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()),
            metrics: TwinMetrics::new(),
            logger,
        };
        let refresh_interval = config.refresh_interval.filter(|period| !period.is_zero());
        if config.host_ttl.is_some() && refresh_interval.is_none() {
            warn!("host_ttl is set without a refresh interval; idle hosts are reaped only on explicit refresh");
        }
        let handle = tokio::spawn(actor.run(inbox, refresh_interval));

        let engine = Self {
            commands,
            publisher,
            twin_id: Arc::from(twin_id),
        };
        (engine, handle)
    }

    pub fn twin_id(&self) -> &str {
        &self.twin_id
    }

    /// Ingest one sample and wait until the actor has applied it
    pub async fn ingest(&self, sample: MetricSample) -> Result<IngestOutcome, TwinError> {
        let (reply, outcome) = oneshot::channel();
        self.send(Command::Ingest {
            sample,
            reply: Some(reply),
        })
        .await?;
        outcome.await.map_err(|_| TwinError::EngineStopped)
    }

    /// Ingest samples one by one; a bad sample never aborts the rest
    pub async fn ingest_batch(
        &self,
        samples: impl IntoIterator<Item = MetricSample>,
    ) -> Result<IngestReport, TwinError> {
        let mut report = IngestReport::default();
        for sample in samples {
            if self.ingest(sample).await?.is_accepted() {
                report.accepted += 1;
            } else {
                report.dropped += 1;
            }
        }
        Ok(report)
    }

    /// Enqueue a sample without waiting for it to be applied
    pub async fn submit(&self, sample: MetricSample) -> Result<(), TwinError> {
        self.send(Command::Ingest { sample, reply: None }).await
    }

    /// Rebuild and publish a snapshot without new data
    pub async fn refresh(&self) -> Result<(), TwinError> {
        let (reply, done) = oneshot::channel();
        self.send(Command::Refresh { reply }).await?;
        done.await.map_err(|_| TwinError::EngineStopped)
    }

    pub fn latest(&self) -> Arc<TwinState> {
        self.publisher.latest()
    }

    /// Host as rendered in the latest snapshot
    pub fn host(&self, hostname: &str) -> Option<HostTwinState> {
        self.publisher.latest().host(hostname).cloned()
    }

    pub fn subscribe(&self) -> SnapshotSubscription {
        self.publisher.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.publisher.subscriber_count()
    }

    /// False once the actor task has exited
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    async fn send(&self, command: Command) -> Result<(), TwinError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TwinError::EngineStopped)
    }
}

fn generate_twin_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    format!("twin-{}", &uuid[..10])
}

/// Sole owner of the mutable twin state
struct EngineActor {
    store: HostStateStore,
    builder: SnapshotBuilder,
    publisher: Arc<SnapshotPublisher>,
    clock: Arc<dyn Clock>,
    host_ttl: Option<chrono::Duration>,
    metrics: TwinMetrics,
    logger: StructuredLogger,
}

impl EngineActor {
    async fn run(mut self, mut inbox: mpsc::Receiver<Command>, refresh_interval: Option<Duration>) {
        let mut ticker = refresh_interval.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        info!(
            twin_id = %self.builder.twin_id(),
            refresh_interval = ?refresh_interval,
            "Twin engine running"
        );

        loop {
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = next_tick(&mut ticker) => self.refresh(),
            }
        }

        self.logger.log_shutdown("all engine handles dropped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Ingest { sample, reply } => {
                let outcome = self.ingest(sample);
                if let Some(reply) = reply {
                    // The caller may have given up waiting
                    let _ = reply.send(outcome);
                }
            }
            Command::Refresh { reply } => {
                self.refresh();
                let _ = reply.send(());
            }
        }
    }

    fn ingest(&mut self, sample: MetricSample) -> IngestOutcome {
        let normalized = match normalize(&sample) {
            Ok(normalized) => normalized,
            Err(reason) => {
                self.metrics.inc_samples_dropped();
                self.logger.log_sample_dropped(&sample.hostname, &reason.to_string());
                return IngestOutcome::Dropped(reason);
            }
        };

        let now = self.clock.now();
        let hostname = normalized.hostname.clone();
        if self.store.ingest(normalized, now) == StoreChange::Created {
            if let Some(host) = self.store.get(&hostname) {
                self.logger
                    .log_host_discovered(&hostname, &host.address.to_string(), self.store.len());
            }
        }

        self.metrics.inc_samples_ingested();
        self.metrics.set_hosts_tracked(self.store.len() as i64);
        self.rebuild(now);

        IngestOutcome::Accepted { hostname }
    }

    fn refresh(&mut self) {
        let now = self.clock.now();
        if let Some(ttl) = self.host_ttl {
            let reaped = self.store.reap_idle(now - ttl);
            if !reaped.is_empty() {
                self.logger.log_hosts_reaped(&reaped, ttl.num_seconds());
                self.metrics.set_hosts_tracked(self.store.len() as i64);
            }
        }
        self.rebuild(now);
    }

    fn rebuild(&mut self, now: DateTime<Utc>) {
        let started = Instant::now();
        let state = self.builder.build(self.store.all_hosts(), now);
        self.metrics.observe_snapshot_build(started.elapsed().as_secs_f64());

        let delivered = self.publisher.publish(state);
        debug!(hosts = self.store.len(), subscribers = delivered, "Published snapshot");
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
