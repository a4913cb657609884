//! Probe scheduling.
//!
//! A fixed-period tick scans the registry and launches one independent task
//! per due endpoint. Each task writes its outcome to the registry, notifies
//! the observer, then publishes the fresh snapshot to live subscribers.

use crate::fanout::FanOut;
use crate::metrics::MetricsRegistry;
use crate::registry::EndpointRegistry;
use crate::types::{Endpoint, EndpointId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uptime_probe::Prober;

/// Hook invoked after every probe outcome has been written to the registry.
pub trait ProbeObserver: Send + Sync {
    fn on_probe_complete(&self, endpoint: &Endpoint);
}

/// Default tick period
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives periodic probing of every registered endpoint
#[derive(Clone)]
pub struct Scheduler {
    registry: Arc<EndpointRegistry>,
    prober: Arc<dyn Prober>,
    fanout: Arc<FanOut>,

    /// Notified synchronously after each registry write
    observer: Option<Arc<dyn ProbeObserver>>,

    /// Metrics registry (optional)
    metrics: Option<Arc<MetricsRegistry>>,

    tick_interval: Duration,
    allow_overlap: bool,

    /// Outstanding probes per endpoint, tracked when overlap is disallowed
    in_flight: Arc<DashMap<EndpointId, usize>>,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        registry: Arc<EndpointRegistry>,
        prober: Arc<dyn Prober>,
        fanout: Arc<FanOut>,
        metrics: Option<Arc<MetricsRegistry>>,
    ) -> Self {
        Self {
            registry,
            prober,
            fanout,
            observer: None,
            metrics,
            tick_interval: DEFAULT_TICK_INTERVAL,
            allow_overlap: true,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProbeObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_allow_overlap(mut self, allow_overlap: bool) -> Self {
        self.allow_overlap = allow_overlap;
        self
    }

    /// Run the tick loop until `cancel` fires.
    ///
    /// Probes already dispatched keep running and still record their outcome.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            allow_overlap = self.allow_overlap,
            "Scheduler started"
        );

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }

    /// Scan the registry once and dispatch every endpoint due at `now`.
    ///
    /// Returns the handles of the dispatched probe tasks. The loop itself
    /// never awaits them.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let start = Instant::now();
        let endpoints = self.registry.list().await;
        let total = endpoints.len();

        let mut handles = Vec::new();
        for endpoint in endpoints {
            if !endpoint.is_due(now) {
                continue;
            }
            if !self.allow_overlap && self.in_flight.contains_key(&endpoint.id) {
                debug!(id = %endpoint.id, "Probe still outstanding, skipping");
                continue;
            }
            handles.push(self.dispatch(endpoint));
        }

        if !handles.is_empty() {
            debug!(due = handles.len(), total, "Dispatched probes");
        }

        if let Some(ref m) = self.metrics {
            m.record_tick_duration(start.elapsed());
            m.update_endpoint_count(total);
        }

        handles
    }

    /// Probe one endpoint immediately, outside the tick cadence.
    ///
    /// Runs even when a probe is outstanding. Returns `None` for an unknown id.
    pub async fn check_now(&self, id: &str) -> Option<JoinHandle<()>> {
        let endpoint = self.registry.get(id).await?;
        info!(id = %id, "Manual check requested");
        Some(self.dispatch(endpoint))
    }

    /// Launch the probe task for one endpoint.
    pub fn dispatch(&self, endpoint: Endpoint) -> JoinHandle<()> {
        if !self.allow_overlap {
            *self.in_flight.entry(endpoint.id.clone()).or_insert(0) += 1;
        }

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.probe_endpoint(endpoint).await;
        })
    }

    async fn probe_endpoint(&self, endpoint: Endpoint) {
        let target = endpoint.probe_target();
        let outcome = self.prober.probe(&target).await;

        debug!(
            id = %endpoint.id,
            status = %outcome.status,
            code = outcome.status_code,
            duration_ms = outcome.response_time_ms,
            "Probe completed"
        );

        let updated = self.registry.update_after_probe(&endpoint.id, outcome).await;

        if !self.allow_overlap {
            self.in_flight.remove_if_mut(&endpoint.id, |_, outstanding| {
                *outstanding -= 1;
                *outstanding == 0
            });
        }

        let Some(updated) = updated else {
            debug!(id = %endpoint.id, "Endpoint removed during probe, outcome dropped");
            return;
        };

        if updated.status != endpoint.status {
            if updated.is_up() {
                info!(id = %updated.id, name = %updated.name, "Endpoint is UP");
            } else {
                warn!(
                    id = %updated.id,
                    name = %updated.name,
                    error = %updated.error,
                    "Endpoint is DOWN"
                );
            }
        }

        if let Some(ref observer) = self.observer {
            observer.on_probe_complete(&updated);
        }

        self.fanout.publish(&updated).await;
    }

    /// Number of endpoints with an outstanding probe (tracked only when
    /// overlap is disallowed)
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
