//! HTTP endpoint probing for the uptime monitor.
//!
//! A probe is one request/response cycle against one endpoint. The outcome
//! classifies the endpoint as up or down:
//! - any response with a status code in `[200, 400)` is up
//! - any other response is down with an `HTTP <code>` error
//! - a transport failure (DNS, connect, TLS, timeout, bad request) is down
//!   with status code 0
//!
//! # Example
//!
//! ```no_run
//! use uptime_probe::{HttpProber, Prober, ProbeTarget};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = HttpProber::new()?;
//! let outcome = prober
//!     .probe(&ProbeTarget {
//!         url: "https://example.com".to_string(),
//!         method: "GET".to_string(),
//!         timeout: Duration::from_secs(5),
//!     })
//!     .await;
//!
//! println!("{} in {}ms", outcome.status, outcome.response_time_ms);
//! # Ok(())
//! # }
//! ```

pub mod prober;
pub mod types;

pub use prober::{HttpProber, Prober};
pub use types::{EndpointStatus, ProbeOutcome, ProbeTarget};
