//! WAYPOINT Telemetry - Observability Infrastructure
//!
//! Provides OpenTelemetry tracing and Prometheus metrics for both Waypoint
//! services. All features work standalone without external dependencies;
//! OTLP export is enabled only when an endpoint is configured.

pub mod metrics;
pub mod middleware;
pub mod tracer;

pub use metrics::{metrics_handler, WaypointMetrics, METRICS};
pub use middleware::observability_middleware;
pub use tracer::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryError};
