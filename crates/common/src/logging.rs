//! Logging utilities for the uptime monitor crates.

use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Build the env filter, falling back to `default_level` when RUST_LOG is unset.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Formatting layer: JSON lines when `json` is set, human-readable text otherwise.
pub fn fmt_layer(json: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    if json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_layers_compose_into_subscriber() {
        for json in [false, true] {
            let subscriber = tracing_subscriber::registry()
                .with(fmt_layer(json))
                .with(env_filter("debug"));
            tracing::subscriber::with_default(subscriber, || {
                tracing::info!(json, "formatted");
            });
        }
    }

    #[test]
    fn test_env_filter_falls_back_to_default() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert_eq!(env_filter("warn").to_string(), "warn");
        }
    }
}
