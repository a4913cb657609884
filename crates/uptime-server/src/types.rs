//! Types for the uptime server: endpoint records, registration input and
//! runtime configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use uptime_probe::{EndpointStatus, ProbeOutcome, ProbeTarget};
use validator::{Validate, ValidationError};

/// Endpoint ID
pub type EndpointId = String;

/// Check interval used when registration supplies none (or a non-positive one)
pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;

/// Probe timeout used when registration supplies none (or a non-positive one)
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 10;

/// Method used when registration supplies none
pub const DEFAULT_METHOD: &str = "GET";

/// A monitored endpoint and its latest observed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub name: String,
    pub url: String,
    pub method: String,
    pub interval_seconds: u64,
    pub timeout_seconds: u64,

    /// Extra metric dimensions
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Free-form probe kind (livez, readyz, healthz, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_type: Option<String>,

    pub status: EndpointStatus,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub last_check: Option<DateTime<Utc>>,
    pub error: String,

    /// Registry write sequence. Later writes of any endpoint carry a higher value.
    #[serde(skip)]
    pub revision: u64,
}

impl Endpoint {
    /// Request parameters for probing this endpoint
    pub fn probe_target(&self) -> ProbeTarget {
        ProbeTarget {
            url: self.url.clone(),
            method: self.method.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }

    /// Overwrite the observed state with one probe outcome.
    pub fn apply(&mut self, outcome: ProbeOutcome) {
        self.status = outcome.status;
        self.status_code = outcome.status_code;
        self.response_time_ms = outcome.response_time_ms;
        self.last_check = Some(outcome.checked_at);
        self.error = outcome.error;
    }

    /// An endpoint is due when it was never checked or its interval elapsed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_check {
            None => true,
            Some(last) => {
                let interval = i64::try_from(self.interval_seconds).unwrap_or(i64::MAX);
                now.signed_duration_since(last).num_seconds() >= interval
            }
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == EndpointStatus::Up
    }
}

/// Registration input, from the config file or the REST API.
///
/// Missing or non-positive interval/timeout fall back to the defaults when
/// the endpoint is added to the registry. A supplied `status` is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct RegisterEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EndpointId>,

    #[serde(default)]
    #[validate(custom = "validate_name")]
    pub name: String,

    #[serde(default)]
    #[validate(custom = "validate_probe_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom = "validate_method")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[validate(custom = "validate_label_keys")]
    pub labels: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_type: Option<String>,

    #[serde(default, skip_serializing)]
    pub status: Option<EndpointStatus>,
}

impl RegisterEndpoint {
    /// Convenience constructor with only the required fields
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Build the initial record. The caller supplies the id to use.
    pub fn into_endpoint(self, id: EndpointId) -> Endpoint {
        let method = self
            .method
            .map(|m| m.trim().to_uppercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_METHOD.to_string());

        Endpoint {
            id,
            name: self.name,
            url: self.url,
            method,
            interval_seconds: positive_or(self.interval_seconds, DEFAULT_INTERVAL_SECONDS),
            timeout_seconds: positive_or(self.timeout_seconds, DEFAULT_TIMEOUT_SECONDS),
            labels: self.labels,
            probe_type: self.probe_type.filter(|p| !p.is_empty()),
            status: EndpointStatus::Checking,
            status_code: 0,
            response_time_ms: 0,
            last_check: None,
            error: String::new(),
            revision: 0,
        }
    }
}

fn positive_or(value: Option<i64>, default: u64) -> u64 {
    match value {
        Some(v) if v > 0 => v as u64,
        _ => default,
    }
}

// Custom validators

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(invalid("name_required", "name is required"));
    }
    Ok(())
}

pub(crate) fn validate_probe_url(url: &str) -> Result<(), ValidationError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(invalid("url_required", "URL is required"));
    }

    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(invalid(
            "url_invalid_scheme",
            "URL must start with http:// or https://",
        ));
    }
    Ok(())
}

fn validate_method(method: &str) -> Result<(), ValidationError> {
    let trimmed = method.trim();
    if trimmed.is_empty() {
        return Ok(());
    }

    // RFC 9110 token characters
    let is_token = trimmed.bytes().all(|b| {
        b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
    });
    if !is_token {
        return Err(invalid("method_invalid", "method must be an HTTP method token"));
    }
    Ok(())
}

fn validate_label_keys(labels: &BTreeMap<String, String>) -> Result<(), ValidationError> {
    for key in labels.keys() {
        if !is_label_name(key) {
            return Err(invalid(
                "label_key_invalid",
                "label keys must match [A-Za-z_][A-Za-z0-9_]*",
            ));
        }
    }
    Ok(())
}

/// Prometheus label name rule
pub(crate) fn is_label_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Runtime configuration of the server, derived from the YAML config
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Main listener (REST API, live feed, probes)
    pub listen_addr: String,

    /// Optional static dashboard directory
    pub static_dir: Option<PathBuf>,

    /// Whether the metrics listener is started
    pub metrics_enabled: bool,

    /// Metrics listener address
    pub metrics_listen_addr: String,

    /// Path of the endpoint exposition
    pub metrics_path: String,

    /// Path of the server's own metrics
    pub metrics_internal_path: String,

    /// Scheduler tick period
    pub tick_interval: Duration,

    /// Whether a due endpoint may be probed while a previous probe is outstanding
    pub allow_overlap: bool,

    /// Per-subscriber queue capacity of the live feed
    pub subscriber_buffer: usize,

    /// Service name reported by health probes and telemetry
    pub service_name: String,

    /// Endpoints registered at startup
    pub endpoints: Vec<RegisterEndpoint>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            static_dir: None,
            metrics_enabled: true,
            metrics_listen_addr: "0.0.0.0:9091".to_string(),
            metrics_path: "/metrics".to_string(),
            metrics_internal_path: "/internal/metrics".to_string(),
            tick_interval: Duration::from_secs(1),
            allow_overlap: true,
            subscriber_buffer: 256,
            service_name: "uptime-server".to_string(),
            endpoints: Vec::new(),
        }
    }
}
