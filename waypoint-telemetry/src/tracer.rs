//! OpenTelemetry Tracer Initialization
//!
//! Sets up an OTLP exporter for distributed tracing compatible with any
//! OTLP backend (Jaeger, Tempo, DataDog, ...). Without a configured
//! endpoint, spans are still captured for local logging.

use opentelemetry::{global, trace::TracerProvider as _, KeyValue};
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
    Resource,
};
use thiserror::Error;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry bootstrap failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to create OTLP exporter: {0}")]
    Exporter(String),

    #[error("Failed to initialize tracing subscriber: {0}")]
    Subscriber(String),
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// OTLP endpoint for traces (e.g. "http://localhost:4318").
    pub otlp_endpoint: Option<String>,
    /// Service name attached to every span.
    pub service_name: String,
    /// Service version.
    pub service_version: String,
    /// Deployment environment (production, staging, development).
    pub environment: String,
    /// Trace sampling ratio in [0.0, 1.0].
    pub trace_sample_rate: f64,
}

impl TelemetryConfig {
    /// Load telemetry configuration for a service.
    ///
    /// # Environment Variables
    /// - `WAYPOINT_OTLP_ENDPOINT`: OTLP trace endpoint (optional)
    /// - `WAYPOINT_ENVIRONMENT`: deployment environment (default: development)
    /// - `WAYPOINT_TRACE_SAMPLE_RATE`: sampling ratio (default: 1.0)
    pub fn from_env(service_name: &str, service_version: &str) -> Self {
        Self {
            otlp_endpoint: std::env::var("WAYPOINT_OTLP_ENDPOINT").ok(),
            service_name: service_name.to_string(),
            service_version: service_version.to_string(),
            environment: std::env::var("WAYPOINT_ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            trace_sample_rate: std::env::var("WAYPOINT_TRACE_SAMPLE_RATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
        }
    }
}

/// Initialize the OpenTelemetry tracer and tracing subscriber.
///
/// Call once at startup before any tracing occurs. Sets up:
/// - W3C TraceContext propagation (traceparent header)
/// - OTLP span export when an endpoint is configured
/// - tracing-subscriber with EnvFilter, JSON formatting, and the OTel layer
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ]);

    let sampler = if config.trace_sample_rate >= 1.0 {
        Sampler::AlwaysOn
    } else if config.trace_sample_rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(config.trace_sample_rate)
    };

    let tracer_provider = if let Some(endpoint) = &config.otlp_endpoint {
        let exporter = SpanExporter::builder()
            .with_http()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

        TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_sampler(sampler)
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
            .build()
    } else {
        TracerProvider::builder()
            .with_sampler(sampler)
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource)
            .build()
    };

    let tracer = tracer_provider.tracer(config.service_name.clone());
    global::set_tracer_provider(tracer_provider);

    let otel_layer = OpenTelemetryLayer::new(tracer);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("waypoint=debug,tower_http=debug,info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    tracing::info!(
        service_name = config.service_name,
        environment = config.environment,
        otlp_endpoint = ?config.otlp_endpoint,
        "Telemetry initialized"
    );

    Ok(())
}

/// Flush pending spans and shut down the tracer provider.
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
    tracing::info!("Tracer shutdown complete");
}
