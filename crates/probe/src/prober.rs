//! Probe implementations.

use crate::types::{ProbeOutcome, ProbeTarget};
use async_trait::async_trait;
use reqwest::Method;
use std::error::Error as _;
use std::time::Instant;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Maximum redirect hops followed within one probe
const MAX_REDIRECTS: usize = 10;

/// Prober trait
#[async_trait]
pub trait Prober: Send + Sync {
    /// Perform one probe against the target. Never fails: transport errors
    /// are reported as a down outcome.
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// HTTP/HTTPS prober
///
/// One client (and connection pool) is shared by every probe. Certificate
/// validation is disabled: a self-signed endpoint that answers is up.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    /// Create a new HTTP prober
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        let start = Instant::now();

        let method = match Method::from_bytes(target.method.as_bytes()) {
            Ok(method) => method,
            Err(e) => {
                warn!(url = %target.url, method = %target.method, "Invalid HTTP method");
                return ProbeOutcome::transport_failure(
                    start.elapsed(),
                    format!("Failed to create request: {}", e),
                );
            }
        };

        let request = match self.client.request(method, &target.url).build() {
            Ok(request) => request,
            Err(e) => {
                warn!(url = %target.url, error = %e, "Failed to build probe request");
                return ProbeOutcome::transport_failure(
                    start.elapsed(),
                    format!("Failed to create request: {}", describe(&e)),
                );
            }
        };

        match timeout(target.timeout, self.client.execute(request)).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status_code = response.status().as_u16();
                let outcome = ProbeOutcome::from_response(status_code, duration);

                if outcome.is_up() {
                    debug!(url = %target.url, status = status_code, duration_ms = outcome.response_time_ms,
                           "Probe successful");
                } else {
                    warn!(url = %target.url, status = status_code, "Probe failed: unexpected status code");
                }
                outcome
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                warn!(url = %target.url, error = %e, "Probe request failed");
                ProbeOutcome::transport_failure(duration, describe(&e))
            }
            Err(_) => {
                let duration = start.elapsed();
                warn!(url = %target.url, timeout = ?target.timeout, "Probe timed out");
                ProbeOutcome::transport_failure(
                    duration,
                    format!("Request timed out after {:?}", target.timeout),
                )
            }
        }
    }
}

/// Human-readable description of a transport error, including its root cause.
fn describe(e: &reqwest::Error) -> String {
    let kind = if e.is_connect() {
        "Connection failed"
    } else if e.is_timeout() {
        "Request timed out"
    } else if e.is_redirect() {
        "Too many redirects"
    } else if e.is_builder() {
        "Invalid request"
    } else {
        "Request failed"
    };

    let mut cause: Option<&dyn std::error::Error> = e.source();
    let mut root = None;
    while let Some(inner) = cause {
        root = Some(inner.to_string());
        cause = inner.source();
    }

    match root {
        Some(root) => format!("{}: {} ({})", kind, e, root),
        None => format!("{}: {}", kind, e),
    }
}
