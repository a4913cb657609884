//! Configuration loading and validation for the uptime server

use crate::http_server::route_conflict;
use crate::types::{RegisterEndpoint, ServerConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub fanout: FanOutSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Endpoints registered at startup
    #[serde(default)]
    pub endpoints: Vec<RegisterEndpoint>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.server.validate()?;
        self.metrics.validate()?;
        self.scheduler.validate()?;
        self.fanout.validate()?;
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        Ok(())
    }
}

/// Main listener settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,

    /// Directory served as the dashboard
    pub static_dir: Option<PathBuf>,
}

/// Metrics listener settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_metrics_routes"))]
pub struct MetricsSettings {
    pub enabled: bool,

    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,

    #[validate(custom = "validate_http_path")]
    pub path: String,

    #[validate(custom = "validate_http_path")]
    pub internal_path: String,
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SchedulerSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_tick_interval")]
    pub tick_interval: Duration,

    /// Probe an endpoint again even if its previous probe is outstanding
    pub allow_overlap: bool,
}

/// Live feed settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct FanOutSettings {
    #[validate(range(min = 1, max = 65536))]
    pub subscriber_buffer: usize,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,

    /// OTLP transport: `grpc` or `http`
    pub protocol: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

impl LoggingSettings {
    pub fn is_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            static_dir: None,
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0:9091".to_string(),
            path: "/metrics".to_string(),
            internal_path: "/internal/metrics".to_string(),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            allow_overlap: true,
        }
    }
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "uptime-server".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            protocol: "grpc".to_string(),
        }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    if addr.trim().parse::<SocketAddr>().is_err() {
        return Err(ValidationError::new("listen_addr_invalid"));
    }
    Ok(())
}

fn validate_http_path(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with('/') {
        return Err(ValidationError::new("path_must_start_with_slash"));
    }
    Ok(())
}

fn validate_metrics_routes(settings: &MetricsSettings) -> Result<(), ValidationError> {
    if route_conflict(&settings.path, &settings.internal_path).is_some() {
        return Err(ValidationError::new("metrics_route_conflict"));
    }
    Ok(())
}

fn validate_tick_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(100..=60_000).contains(&millis) {
        return Err(ValidationError::new("tick_interval_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from an explicit path, or the default search paths
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::FileNotFound(path.to_path_buf()));
                }
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)
            }
            None => Self::load(),
        }
    }

    /// Load configuration from default search paths
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents, |key| std::env::var(key).ok())
    }

    /// Parse, apply overrides from `lookup`, then validate
    pub fn from_yaml<F>(contents: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `WEB_PORT`, `SERVER_PORT`, `METRICS_ENABLED`, `METRICS_PORT`
    /// and `METRICS_PATH` overrides. `SERVER_PORT` wins over `WEB_PORT`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());

        for key in ["WEB_PORT", "SERVER_PORT"] {
            if let Some(port) = lookup(key) {
                self.server.listen_addr = with_port(&self.server.listen_addr, &port);
            }
        }

        if let Some(enabled) = lookup("METRICS_ENABLED") {
            self.metrics.enabled = enabled == "true";
        }

        if let Some(port) = lookup("METRICS_PORT") {
            self.metrics.listen_addr = with_port(&self.metrics.listen_addr, &port);
        }

        if let Some(path) = lookup("METRICS_PATH") {
            self.metrics.path = path;
        }
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/uptime-monitor/uptime-server.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./uptime-server.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/uptime-monitor/uptime-server.yaml"))
    }

    /// Convert to the runtime ServerConfig
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_addr: self.server.listen_addr.clone(),
            static_dir: self.server.static_dir.clone(),
            metrics_enabled: self.metrics.enabled,
            metrics_listen_addr: self.metrics.listen_addr.clone(),
            metrics_path: self.metrics.path.clone(),
            metrics_internal_path: self.metrics.internal_path.clone(),
            tick_interval: self.scheduler.tick_interval,
            allow_overlap: self.scheduler.allow_overlap,
            subscriber_buffer: self.fanout.subscriber_buffer,
            service_name: self.telemetry.service_name.clone(),
            endpoints: self.endpoints.clone(),
        }
    }
}

/// Replace the port of `host:port`, keeping the host
fn with_port(addr: &str, port: &str) -> String {
    let host = addr.rsplit_once(':').map(|(host, _)| host).unwrap_or("0.0.0.0");
    format!("{}:{}", host, port.trim())
}
