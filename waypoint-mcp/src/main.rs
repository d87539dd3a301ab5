//! WAYPOINT Retrieval Service Entry Point
//!
//! Bootstraps telemetry, verifies that the database and counter store are
//! reachable (both fatal if not), registers the retrieval tools, and
//! starts the Axum HTTP server with graceful shutdown.

use std::sync::Arc;

use waypoint_mcp::{
    create_router, load_public_key_pem, ApiError, ApiResult, AuthConfig, AuthState, DbClient,
    DbConfig, HybridSearchTool, ListDocumentsTool, McpConfig, McpState, RateLimiter,
    RetrieveDocumentTool, SearchDocumentsTool, SystemClock, TokenValidator, ToolRegistry,
};
use waypoint_telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env("waypoint-mcp", env!("CARGO_PKG_VERSION"));
    init_telemetry(&telemetry_config)
        .map_err(|e| ApiError::internal_error(format!("Failed to initialize telemetry: {}", e)))?;

    let config = McpConfig::from_env();

    // Database: unreachable at startup is fatal.
    let db = DbClient::from_config(&DbConfig::from_env())?;
    db.health_check().await?;
    tracing::info!("Database connected");

    // Counter store: unreachable at startup is fatal; per-request failures
    // later fail open inside the limiter.
    let redis_client = redis::Client::open(config.redis_url.as_str())
        .map_err(|e| ApiError::internal_error(format!("Invalid Redis URL: {}", e)))?;
    let mut redis_conn = redis_client
        .get_multiplexed_async_connection()
        .await
        .map_err(|e| ApiError::service_unavailable(format!("Failed to connect to Redis: {}", e)))?;
    redis::cmd("PING")
        .query_async::<String>(&mut redis_conn)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("Redis ping failed: {}", e)))?;
    tracing::info!("Counter store connected");

    let validator = TokenValidator::new(AuthConfig {
        public_key_pem: load_public_key_pem()?,
        issuer: config.issuer.clone(),
        audience: config.audience.clone(),
        leeway_secs: config.jwt_leeway_secs,
        clock: Arc::new(SystemClock),
    })?;

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchDocumentsTool::new(db.clone())))?;
    registry.register(Arc::new(RetrieveDocumentTool::new(db.clone())))?;
    registry.register(Arc::new(ListDocumentsTool::new(db.clone())))?;
    registry.register(Arc::new(HybridSearchTool::new(db.clone())))?;
    tracing::info!(tool_count = registry.len(), "Tool registry populated");

    let limiter = RateLimiter::new(redis_client, config.rate_limit, config.rate_limit_window_secs);

    let state = Arc::new(McpState {
        db: db.clone(),
        registry,
    });
    let app = create_router(state, AuthState::new(validator), limiter);

    let addr = config.bind_addr()?;
    tracing::info!(%addr, "Starting retrieval service");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    shutdown_telemetry();
    Ok(())
}

/// Resolve when SIGINT or SIGTERM arrives; in-flight requests then drain.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests");
}
