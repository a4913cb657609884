//! Probe types and structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Observed status of a monitored endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    /// Registered but not probed yet
    #[default]
    Checking,
    /// Last probe got a 2xx/3xx response
    Up,
    /// Last probe failed or got any other response
    Down,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Checking => "checking",
            EndpointStatus::Up => "up",
            EndpointStatus::Down => "down",
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single probe needs to know about an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Full URL to request
    pub url: String,

    /// HTTP method (already normalized to upper case)
    pub method: String,

    /// Request deadline
    pub timeout: Duration,
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    /// Up or down. Never `Checking`.
    pub status: EndpointStatus,

    /// HTTP status code, 0 when no response was received
    pub status_code: u16,

    /// End-to-end duration of the attempt in whole milliseconds
    pub response_time_ms: u64,

    /// Failure description, empty when up
    pub error: String,

    /// Completion time of the attempt
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    /// Classify a received HTTP response.
    pub fn from_response(status_code: u16, elapsed: Duration) -> Self {
        let (status, error) = if (200..400).contains(&status_code) {
            (EndpointStatus::Up, String::new())
        } else {
            (EndpointStatus::Down, format!("HTTP {}", status_code))
        };

        Self {
            status,
            status_code,
            response_time_ms: elapsed_ms(elapsed),
            error,
            checked_at: Utc::now(),
        }
    }

    /// Transport-level failure: no response was received.
    pub fn transport_failure(elapsed: Duration, message: impl Into<String>) -> Self {
        Self {
            status: EndpointStatus::Down,
            status_code: 0,
            response_time_ms: elapsed_ms(elapsed),
            error: message.into(),
            checked_at: Utc::now(),
        }
    }

    /// Check if the outcome is up
    pub fn is_up(&self) -> bool {
        self.status == EndpointStatus::Up
    }
}

fn elapsed_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
