//! Tracing setup with optional OpenTelemetry export
//!
//! Installs the global `tracing` subscriber: an env filter, a text or JSON
//! formatter, and an OTLP span exporter when telemetry is enabled.

use crate::config::{LoggingSettings, TelemetrySettings};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build the OTLP tracer provider
///
/// # Arguments
///
/// * `settings` - service name, collector endpoint and transport
///   (`grpc`, e.g. "http://localhost:4317", or `http`, e.g.
///   "http://localhost:4318/v1/traces")
pub fn init_tracer_provider(settings: &TelemetrySettings) -> Result<TracerProvider, BoxError> {
    let exporter = match settings.protocol.as_str() {
        "http" => opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_endpoint(&settings.otlp_endpoint)
            .build()?,
        _ => opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&settings.otlp_endpoint)
            .build()?,
    };

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build();

    opentelemetry::global::set_tracer_provider(provider.clone());
    Ok(provider)
}

/// Install the global subscriber.
///
/// Returns a guard when OpenTelemetry export is enabled. Keep it alive for
/// the lifetime of the process.
pub fn setup_tracing(
    logging: &LoggingSettings,
    telemetry: &TelemetrySettings,
) -> Result<Option<TelemetryGuard>, BoxError> {
    let level = logging.level.as_deref().unwrap_or("info");

    let provider = if telemetry.enabled {
        Some(init_tracer_provider(telemetry)?)
    } else {
        None
    };
    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer("uptime-server"))
    });

    tracing_subscriber::registry()
        .with(common::logging::fmt_layer(logging.is_json()))
        .with(common::logging::env_filter(level))
        .with(otel_layer)
        .try_init()?;

    if telemetry.enabled {
        tracing::info!(
            service_name = %telemetry.service_name,
            otlp_endpoint = %telemetry.otlp_endpoint,
            protocol = %telemetry.protocol,
            "Tracing initialized with OpenTelemetry integration"
        );
        Ok(Some(TelemetryGuard))
    } else {
        tracing::info!(level, json = logging.is_json(), "Tracing initialized");
        Ok(None)
    }
}
