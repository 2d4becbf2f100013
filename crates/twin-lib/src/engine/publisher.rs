//! Snapshot fan-out
//!
//! Holds the current snapshot and broadcasts every new one. A subscriber
//! first receives the snapshot that was current when it subscribed, then
//! every later one in publication order. Slow subscribers lose the oldest
//! snapshots instead of slowing down the publisher.

use crate::models::TwinState;
use crate::observability::TwinMetrics;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Latest-value holder plus broadcast channel
#[derive(Debug)]
pub struct SnapshotPublisher {
    latest: RwLock<Arc<TwinState>>,
    sender: broadcast::Sender<Arc<TwinState>>,
    live: Arc<AtomicUsize>,
    metrics: TwinMetrics,
}

impl SnapshotPublisher {
    /// `buffer` bounds how far a subscriber may fall behind before it lags
    pub fn new(initial: TwinState, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            latest: RwLock::new(Arc::new(initial)),
            sender,
            live: Arc::new(AtomicUsize::new(0)),
            metrics: TwinMetrics::new(),
        }
    }

    /// Most recent snapshot; never waits on ingestion
    pub fn latest(&self) -> Arc<TwinState> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current snapshot and push it to every subscriber
    ///
    /// Returns the number of subscribers the snapshot was queued for. Never
    /// blocks on a subscriber.
    pub fn publish(&self, state: TwinState) -> usize {
        let state = Arc::new(state);
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *latest = state.clone();
        // Err only means nobody is listening right now
        let delivered = self.sender.send(state).unwrap_or(0);
        drop(latest);

        self.metrics.inc_snapshots_published();
        delivered
    }

    /// Register a subscriber
    ///
    /// Holding the read lock while registering means no publish can land
    /// between capturing the replay snapshot and joining the channel.
    pub fn subscribe(&self) -> SnapshotSubscription {
        let latest = self.latest.read().unwrap_or_else(PoisonError::into_inner);
        let receiver = self.sender.subscribe();
        let initial = latest.clone();
        drop(latest);

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics.set_subscribers(live as i64);
        SnapshotSubscription {
            initial: Some(initial),
            receiver,
            lagged: 0,
            metrics: self.metrics.clone(),
            _guard: SubscriberGuard {
                live: self.live.clone(),
                metrics: self.metrics.clone(),
            },
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Keeps the subscriber gauge in step with live subscriptions
#[derive(Debug)]
struct SubscriberGuard {
    live: Arc<AtomicUsize>,
    metrics: TwinMetrics,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        let remaining = self.live.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.metrics.set_subscribers(remaining as i64);
    }
}

/// One observer's view of the snapshot stream
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct SnapshotSubscription {
    initial: Option<Arc<TwinState>>,
    receiver: broadcast::Receiver<Arc<TwinState>>,
    lagged: u64,
    metrics: TwinMetrics,
    _guard: SubscriberGuard,
}

impl SnapshotSubscription {
    /// Next snapshot, or `None` once the publisher is gone
    pub async fn next(&mut self) -> Option<Arc<TwinState>> {
        if let Some(initial) = self.initial.take() {
            return Some(initial);
        }

        loop {
            match self.receiver.recv().await {
                Ok(state) => return Some(state),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped = skipped, "Snapshot subscriber lagged, skipping ahead");
                    self.lagged += skipped;
                    self.metrics.inc_snapshots_lagged(skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Snapshots this subscriber missed because it fell behind
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    /// Adapt into a [`Stream`], replay first
    pub fn into_stream(self) -> impl Stream<Item = Arc<TwinState>> + Send + 'static {
        let metrics = self.metrics;
        let guard = self._guard;
        let updates = BroadcastStream::new(self.receiver).filter_map(move |item| {
            let _held = &guard;
            match item {
                Ok(state) => Some(state),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    metrics.inc_snapshots_lagged(skipped);
                    None
                }
            }
        });
        tokio_stream::iter(self.initial).chain(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TWIN_STATE_TYPE;
    use tokio_test::{assert_pending, assert_ready, task};

    fn state(generation: u32) -> TwinState {
        TwinState {
            kind: TWIN_STATE_TYPE.to_string(),
            twin_id: "twin-test".to_string(),
            generated_at: format!("gen-{generation}"),
            hosts: vec![],
            links: vec![],
        }
    }

    #[test]
    fn test_latest_before_any_publish_is_initial() {
        let publisher = SnapshotPublisher::new(state(0), 4);
        assert_eq!(publisher.latest().generated_at, "gen-0");
    }

    #[test]
    fn test_publish_replaces_latest() {
        let publisher = SnapshotPublisher::new(state(0), 4);
        assert_eq!(publisher.publish(state(1)), 0);
        assert_eq!(publisher.latest().generated_at, "gen-1");
    }

    #[test]
    fn test_subscriber_gets_replay_then_waits() {
        let publisher = SnapshotPublisher::new(state(0), 4);
        publisher.publish(state(1));

        let mut subscription = publisher.subscribe();
        let mut first = task::spawn(subscription.next());
        let replay = assert_ready!(first.poll()).unwrap();
        assert_eq!(replay.generated_at, "gen-1");
        drop(first);

        let mut second = task::spawn(subscription.next());
        assert_pending!(second.poll());

        publisher.publish(state(2));
        assert!(second.is_woken());
        let update = assert_ready!(second.poll()).unwrap();
        assert_eq!(update.generated_at, "gen-2");
    }

    #[tokio::test]
    async fn test_subscribers_see_publication_order() {
        let publisher = SnapshotPublisher::new(state(0), 8);
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        for generation in 1..=3 {
            assert_eq!(publisher.publish(state(generation)), 2);
        }

        for subscription in [&mut a, &mut b] {
            let seen: Vec<String> = {
                let mut seen = Vec::new();
                for _ in 0..4 {
                    seen.push(subscription.next().await.unwrap().generated_at.clone());
                }
                seen
            };
            assert_eq!(seen, vec!["gen-0", "gen-1", "gen-2", "gen-3"]);
        }
    }

    #[tokio::test]
    async fn test_slow_subscriber_skips_oldest() {
        let publisher = SnapshotPublisher::new(state(0), 2);
        let mut slow = publisher.subscribe();

        for generation in 1..=5 {
            publisher.publish(state(generation));
        }

        assert_eq!(slow.next().await.unwrap().generated_at, "gen-0");
        assert_eq!(slow.next().await.unwrap().generated_at, "gen-4");
        assert_eq!(slow.next().await.unwrap().generated_at, "gen-5");
        assert_eq!(slow.lagged(), 3);
        assert_eq!(publisher.latest().generated_at, "gen-5");
    }

    #[tokio::test]
    async fn test_dropped_subscription_releases_slot() {
        let publisher = SnapshotPublisher::new(state(0), 4);
        let subscription = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        drop(subscription);
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(publisher.publish(state(1)), 0);
    }

    #[test]
    fn test_dropped_stream_releases_slot() {
        let publisher = SnapshotPublisher::new(state(0), 4);
        let stream = publisher.subscribe().into_stream();
        assert_eq!(publisher.subscriber_count(), 1);
        assert_eq!(publisher.live.load(Ordering::SeqCst), 1);

        drop(stream);
        assert_eq!(publisher.subscriber_count(), 0);
        assert_eq!(publisher.live.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_next_ends_when_publisher_dropped() {
        let publisher = SnapshotPublisher::new(state(0), 4);
        let mut subscription = publisher.subscribe();
        drop(publisher);

        assert!(subscription.next().await.is_some());
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stream_replays_then_follows() {
        let publisher = SnapshotPublisher::new(state(0), 4);
        let stream = publisher.subscribe().into_stream();
        publisher.publish(state(1));
        drop(publisher);

        let seen: Vec<String> = stream.map(|s| s.generated_at.clone()).collect().await;
        assert_eq!(seen, vec!["gen-0", "gen-1"]);
    }
}
