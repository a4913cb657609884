//! Prometheus metrics about the uptime server itself.
//!
//! These describe the monitor (probe throughput, subscribers, publish
//! failures, tick latency). Per-endpoint results are rendered separately by
//! [`crate::exposition`].

use crate::scheduler::ProbeObserver;
use crate::types::Endpoint;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for probe result metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ProbeLabels {
    /// Outcome status (up, down)
    pub status: String,
}

/// Labels for publish failure metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PublishFailureLabels {
    /// Failure reason (serialize, delivery)
    pub reason: String,
}

/// Metrics registry with all uptime server metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    /// Completed probes by status
    probes_total: Family<ProbeLabels, Counter>,
    /// Probe response time
    probe_duration_seconds: Histogram,
    /// Registered endpoints
    endpoints_registered: Gauge,
    /// Connected live feed subscribers
    live_subscribers: Gauge,
    /// Failed publishes by reason
    publish_failures_total: Family<PublishFailureLabels, Counter>,
    /// Scheduler tick duration
    tick_duration_seconds: Histogram,
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let probes_total = Family::<ProbeLabels, Counter>::default();
        registry.register(
            "uptime_probes",
            "Total probes completed",
            probes_total.clone(),
        );

        // Exponential buckets from 1ms to ~16s
        let probe_duration_seconds = Histogram::new(exponential_buckets(0.001, 2.0, 15));
        registry.register(
            "uptime_probe_duration_seconds",
            "Probe response time in seconds",
            probe_duration_seconds.clone(),
        );

        let endpoints_registered = Gauge::default();
        registry.register(
            "uptime_endpoints_registered",
            "Number of registered endpoints",
            endpoints_registered.clone(),
        );

        let live_subscribers = Gauge::default();
        registry.register(
            "uptime_live_subscribers",
            "Number of connected live feed subscribers",
            live_subscribers.clone(),
        );

        let publish_failures_total = Family::<PublishFailureLabels, Counter>::default();
        registry.register(
            "uptime_publish_failures",
            "Endpoint updates that could not be delivered",
            publish_failures_total.clone(),
        );

        // Exponential buckets from 10µs to ~160ms
        let tick_duration_seconds = Histogram::new(exponential_buckets(0.00001, 2.0, 15));
        registry.register(
            "uptime_scheduler_tick_duration_seconds",
            "Time spent scanning and dispatching per scheduler tick",
            tick_duration_seconds.clone(),
        );

        Self {
            registry,
            probes_total,
            probe_duration_seconds,
            endpoints_registered,
            live_subscribers,
            publish_failures_total,
            tick_duration_seconds,
        }
    }

    /// Record one completed probe
    pub fn record_probe(&self, status: &str, duration: Duration) {
        self.probes_total
            .get_or_create(&ProbeLabels {
                status: status.to_string(),
            })
            .inc();
        self.probe_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Update registered endpoint count
    pub fn update_endpoint_count(&self, count: usize) {
        self.endpoints_registered.set(count as i64);
    }

    /// Update live subscriber count
    pub fn set_live_subscribers(&self, count: usize) {
        self.live_subscribers.set(count as i64);
    }

    /// Record failed publishes
    pub fn record_publish_failure(&self, reason: &str, count: u64) {
        self.publish_failures_total
            .get_or_create(&PublishFailureLabels {
                reason: reason.to_string(),
            })
            .inc_by(count);
    }

    /// Record scheduler tick duration
    pub fn record_tick_duration(&self, duration: Duration) {
        self.tick_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Encode in OpenMetrics text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeObserver for MetricsRegistry {
    fn on_probe_complete(&self, endpoint: &Endpoint) {
        self.record_probe(
            endpoint.status.as_str(),
            Duration::from_millis(endpoint.response_time_ms),
        );
    }
}
