//! Fan-out of endpoint updates to live feed subscribers.

use crate::metrics::MetricsRegistry;
use crate::registry::EndpointRegistry;
use crate::types::{Endpoint, EndpointId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Subscriber ID
pub type SubscriberId = u64;

/// Handle of one live subscriber: drain `rx` and forward to the connection.
pub struct Subscription {
    pub id: SubscriberId,
    pub rx: mpsc::Receiver<String>,
}

/// Sending half of one subscription
struct Subscriber {
    tx: mpsc::Sender<String>,

    /// Highest revision queued per endpoint
    seen: HashMap<EndpointId, u64>,
}

impl Subscriber {
    fn is_stale(&self, endpoint: &Endpoint) -> bool {
        self.seen
            .get(&endpoint.id)
            .is_some_and(|&seen| endpoint.revision <= seen)
    }
}

/// Pushes serialized endpoint snapshots to every live subscriber.
///
/// Each subscriber owns a bounded queue. Delivery never waits: a closed or
/// full queue drops the subscriber. A snapshot older than the last one a
/// subscriber received for the same endpoint is skipped, so per-endpoint
/// updates arrive in registry write order. The subscriber set has its own
/// lock, separate from the registry lock.
pub struct FanOut {
    /// Active subscribers mapped by ID
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,

    /// Next subscriber ID
    next_id: AtomicU64,

    /// Queue capacity for incremental updates
    buffer: usize,

    /// Metrics registry (optional)
    metrics: Option<Arc<MetricsRegistry>>,
}

impl FanOut {
    /// Create a new fan-out
    pub fn new(buffer: usize, metrics: Option<Arc<MetricsRegistry>>) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
            metrics,
        }
    }

    /// Add a subscriber.
    ///
    /// The returned queue already holds one message per registered endpoint,
    /// ahead of any update published after this call.
    pub async fn subscribe(&self, registry: &EndpointRegistry) -> Subscription {
        // Held across the snapshot so no publish slips in between
        let mut subscribers = self.subscribers.lock().await;

        let snapshot = registry.list().await;
        let (tx, rx) = mpsc::channel(self.buffer + snapshot.len());
        let mut seen = HashMap::with_capacity(snapshot.len());
        for endpoint in &snapshot {
            seen.insert(endpoint.id.clone(), endpoint.revision);
            if let Some(message) = self.serialize(endpoint) {
                // Capacity covers the snapshot
                let _ = tx.try_send(message);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        subscribers.insert(id, Subscriber { tx, seen });
        info!(subscriber = id, snapshot = snapshot.len(), "Live subscriber connected");

        self.update_subscriber_gauge(subscribers.len());
        Subscription { id, rx }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.remove(&id).is_some() {
            info!(subscriber = id, "Live subscriber disconnected");
        }
        self.update_subscriber_gauge(subscribers.len());
    }

    /// Deliver one endpoint snapshot to every subscriber.
    ///
    /// Returns the number of subscribers that accepted the message. Those
    /// already holding the same or a newer revision of the endpoint are
    /// skipped and not counted.
    pub async fn publish(&self, endpoint: &Endpoint) -> usize {
        let Some(message) = self.serialize(endpoint) else {
            return 0;
        };

        let mut subscribers = self.subscribers.lock().await;
        let before = subscribers.len();
        let mut delivered = 0;

        subscribers.retain(|id, sub| {
            if sub.is_stale(endpoint) {
                debug!(subscriber = *id, endpoint = %endpoint.id, revision = endpoint.revision, "Skipping stale update");
                return true;
            }
            match sub.tx.try_send(message.clone()) {
                Ok(()) => {
                    sub.seen.insert(endpoint.id.clone(), endpoint.revision);
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = *id, endpoint = %endpoint.id, "Subscriber queue full, dropping subscriber");
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = *id, "Subscriber gone, dropping");
                    false
                }
            }
        });

        let remaining = subscribers.len();
        let dropped = before - remaining;
        if dropped > 0 {
            if let Some(ref m) = self.metrics {
                m.record_publish_failure("delivery", dropped as u64);
            }
            self.update_subscriber_gauge(remaining);
        }

        debug!(endpoint = %endpoint.id, status = %endpoint.status, delivered, "Published endpoint update");
        delivered
    }

    /// Number of active subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    fn serialize(&self, endpoint: &Endpoint) -> Option<String> {
        match encode(endpoint) {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(endpoint = %endpoint.id, error = %e, "Failed to serialize endpoint update");
                if let Some(ref m) = self.metrics {
                    m.record_publish_failure("serialize", 1);
                }
                None
            }
        }
    }

    fn update_subscriber_gauge(&self, count: usize) {
        if let Some(ref m) = self.metrics {
            m.set_live_subscribers(count);
        }
    }
}

/// One live feed message: the endpoint record as JSON
pub fn encode(endpoint: &Endpoint) -> common::Result<String> {
    Ok(serde_json::to_string(endpoint)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RegisterEndpoint;
    use std::time::Duration;
    use uptime_probe::ProbeOutcome;

    async fn probed(registry: &EndpointRegistry, id: &str, code: u16) -> Endpoint {
        registry
            .update_after_probe(id, ProbeOutcome::from_response(code, Duration::from_millis(3)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_receives_snapshot_first() {
        let registry = EndpointRegistry::new();
        registry.add(RegisterEndpoint::new("A", "https://a.example")).await;
        registry.add(RegisterEndpoint::new("B", "https://b.example")).await;

        let fanout = FanOut::new(8, None);
        let mut sub = fanout.subscribe(&registry).await;

        let mut names = Vec::new();
        for _ in 0..2 {
            let msg = sub.rx.try_recv().unwrap();
            let ep: Endpoint = serde_json::from_str(&msg).unwrap();
            names.push(ep.name);
        }
        names.sort();
        assert_eq!(names, vec!["A", "B"]);
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let registry = EndpointRegistry::new();
        let id = registry.add(RegisterEndpoint::new("A", "https://a.example")).await;

        let fanout = FanOut::new(8, None);
        let mut first = fanout.subscribe(&registry).await;
        let mut second = fanout.subscribe(&registry).await;
        first.rx.try_recv().unwrap();
        second.rx.try_recv().unwrap();

        let updated = registry
            .update_after_probe(&id, ProbeOutcome::from_response(200, Duration::from_millis(4)))
            .await
            .unwrap();
        assert_eq!(fanout.publish(&updated).await, 2);

        for sub in [&mut first, &mut second] {
            let ep: Endpoint = serde_json::from_str(&sub.rx.try_recv().unwrap()).unwrap();
            assert_eq!(ep.status_code, 200);
        }
    }

    #[tokio::test]
    async fn test_closed_subscriber_is_dropped() {
        let registry = EndpointRegistry::new();
        let id = registry.add(RegisterEndpoint::new("A", "https://a.example")).await;

        let fanout = FanOut::new(8, None);
        let gone = fanout.subscribe(&registry).await;
        let mut alive = fanout.subscribe(&registry).await;
        drop(gone);

        let endpoint = probed(&registry, &id, 200).await;
        assert_eq!(fanout.publish(&endpoint).await, 1);
        assert_eq!(fanout.subscriber_count().await, 1);

        alive.rx.try_recv().unwrap(); // snapshot
        alive.rx.try_recv().unwrap(); // update
    }

    #[tokio::test]
    async fn test_slow_subscriber_is_dropped_without_blocking() {
        let registry = EndpointRegistry::new();
        let id = registry.add(RegisterEndpoint::new("A", "https://a.example")).await;

        let fanout = FanOut::new(1, None);
        let _slow = fanout.subscribe(&registry).await;

        // Snapshot consumed nothing; one update fits, the next overflows
        let first = probed(&registry, &id, 200).await;
        assert_eq!(fanout.publish(&first).await, 1);
        let second = probed(&registry, &id, 503).await;
        assert_eq!(fanout.publish(&second).await, 0);
        assert_eq!(fanout.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_stale_update_is_not_delivered() {
        let registry = EndpointRegistry::new();
        let id = registry.add(RegisterEndpoint::new("A", "https://a.example")).await;

        let fanout = FanOut::new(8, None);
        let mut sub = fanout.subscribe(&registry).await;
        sub.rx.try_recv().unwrap();

        let older = probed(&registry, &id, 500).await;
        let newer = probed(&registry, &id, 200).await;

        // Newer write published first, older one arrives late
        assert_eq!(fanout.publish(&newer).await, 1);
        assert_eq!(fanout.publish(&older).await, 0);
        assert_eq!(fanout.subscriber_count().await, 1);

        let ep: Endpoint = serde_json::from_str(&sub.rx.try_recv().unwrap()).unwrap();
        assert_eq!(ep.status_code, 200);
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_snapshot_supersedes_older_pending_update() {
        let registry = EndpointRegistry::new();
        let id = registry.add(RegisterEndpoint::new("A", "https://a.example")).await;

        let older = probed(&registry, &id, 500).await;
        probed(&registry, &id, 200).await;

        let fanout = FanOut::new(8, None);
        let mut sub = fanout.subscribe(&registry).await;
        let ep: Endpoint = serde_json::from_str(&sub.rx.try_recv().unwrap()).unwrap();
        assert_eq!(ep.status_code, 200);

        assert_eq!(fanout.publish(&older).await, 0);
        assert!(sub.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let registry = EndpointRegistry::new();
        let fanout = FanOut::new(4, None);
        let sub = fanout.subscribe(&registry).await;
        assert_eq!(fanout.subscriber_count().await, 1);

        fanout.unsubscribe(sub.id).await;
        fanout.unsubscribe(sub.id).await;
        assert_eq!(fanout.subscriber_count().await, 0);
    }
}
