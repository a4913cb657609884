//! Uptime monitor server
//!
//! Periodically probes registered HTTP endpoints and publishes their state
//! three ways: a REST API, a WebSocket live feed and a Prometheus text
//! exposition.
//!
//! # Components
//!
//! - **Registry**: owns every endpoint record behind one reader/writer lock
//! - **Scheduler**: ticks every second and launches a probe per due endpoint
//! - **FanOut**: pushes each updated record to live feed subscribers
//! - **Exposition**: renders registry snapshots as Prometheus text
//! - **MetricsRegistry**: the server's own metrics (probe counts, tick latency)
//!
//! Probing itself lives in the `uptime-probe` crate.

pub mod api;
pub mod config;
pub mod exposition;
pub mod fanout;
pub mod health;
pub mod http_server;
pub mod live;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod telemetry;
pub mod types;

pub use api::{ApiError, AppState};
pub use config::{Config, ConfigError};
pub use fanout::{FanOut, Subscription};
pub use http_server::MetricsServer;
pub use metrics::MetricsRegistry;
pub use registry::EndpointRegistry;
pub use scheduler::{ProbeObserver, Scheduler};
pub use server::{RunningServer, UptimeServer};
pub use telemetry::{TelemetryGuard, setup_tracing};
pub use types::{Endpoint, EndpointId, RegisterEndpoint, ServerConfig};
