//! Prometheus Metrics Definitions
//!
//! One registry container shared by both services; each service touches
//! only the families relevant to its surface. Exposed through the
//! `/metrics` handler in Prometheus text format.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

/// HTTP request latency buckets (seconds).
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Storage operation latency buckets (seconds).
const DB_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0];

/// Global metrics instance, registered once at first touch.
pub static METRICS: Lazy<Result<WaypointMetrics, prometheus::Error>> =
    Lazy::new(WaypointMetrics::new);

/// Container for all Waypoint metric families.
#[derive(Clone)]
pub struct WaypointMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// JSON-RPC request counter - labels: method, status
    pub rpc_requests_total: CounterVec,

    /// Tool invocation counter - labels: tool, status
    pub tool_calls_total: CounterVec,

    /// Storage operation counter - labels: operation, status
    pub db_operations_total: CounterVec,

    /// Storage operation duration histogram - labels: operation
    pub db_operation_duration_seconds: HistogramVec,

    /// Rate limiter outcome counter - labels: outcome (allowed/denied/error)
    pub rate_limit_checks_total: CounterVec,

    /// Task state transition counter - labels: state
    pub task_transitions_total: CounterVec,

    /// Budget admission counter - labels: outcome (allowed/denied)
    pub budget_checks_total: CounterVec,

    /// Currently open SSE subscriptions.
    pub sse_subscriptions: Gauge,
}

impl WaypointMetrics {
    /// Create and register all metric families.
    pub fn new() -> Result<Self, prometheus::Error> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "waypoint_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )?,
            http_request_duration_seconds: register_histogram_vec!(
                "waypoint_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )?,
            rpc_requests_total: register_counter_vec!(
                "waypoint_rpc_requests_total",
                "Total JSON-RPC requests",
                &["rpc_method", "status"]
            )?,
            tool_calls_total: register_counter_vec!(
                "waypoint_tool_calls_total",
                "Total tool invocations",
                &["tool", "status"]
            )?,
            db_operations_total: register_counter_vec!(
                "waypoint_db_operations_total",
                "Total storage operations",
                &["operation", "status"]
            )?,
            db_operation_duration_seconds: register_histogram_vec!(
                "waypoint_db_operation_duration_seconds",
                "Storage operation duration in seconds",
                &["operation"],
                DB_LATENCY_BUCKETS.to_vec()
            )?,
            rate_limit_checks_total: register_counter_vec!(
                "waypoint_rate_limit_checks_total",
                "Rate limiter outcomes",
                &["outcome"]
            )?,
            task_transitions_total: register_counter_vec!(
                "waypoint_task_transitions_total",
                "Task state transitions",
                &["state"]
            )?,
            budget_checks_total: register_counter_vec!(
                "waypoint_budget_checks_total",
                "Budget admission outcomes",
                &["outcome"]
            )?,
            sse_subscriptions: register_gauge!(
                "waypoint_sse_subscriptions",
                "Currently open SSE subscriptions"
            )?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    /// Record a JSON-RPC request by method.
    pub fn record_rpc_request(&self, method: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.rpc_requests_total
            .with_label_values(&[method, status])
            .inc();
    }

    /// Record a tool invocation.
    pub fn record_tool_call(&self, tool: &str, success: bool) {
        let status = if success { "success" } else { "error" };
        self.tool_calls_total.with_label_values(&[tool, status]).inc();
    }

    /// Record a storage operation.
    pub fn record_db_operation(&self, operation: &str, success: bool, duration_secs: f64) {
        let status = if success { "success" } else { "error" };
        self.db_operations_total
            .with_label_values(&[operation, status])
            .inc();
        self.db_operation_duration_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    /// Record a rate limiter outcome.
    pub fn record_rate_limit(&self, outcome: &str) {
        self.rate_limit_checks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a task state transition.
    pub fn record_task_transition(&self, state: &str) {
        self.task_transitions_total.with_label_values(&[state]).inc();
    }

    /// Record a budget admission outcome.
    pub fn record_budget_check(&self, allowed: bool) {
        let outcome = if allowed { "allowed" } else { "denied" };
        self.budget_checks_total.with_label_values(&[outcome]).inc();
    }

    pub fn sse_opened(&self) {
        self.sse_subscriptions.inc();
    }

    pub fn sse_closed(&self) {
        self.sse_subscriptions.dec();
    }
}

/// Handler for the GET /metrics endpoint (Prometheus text format).
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
