//! WAYPOINT Task Service Entry Point
//!
//! Bootstraps telemetry, registers the agent card and budget tiers,
//! starts the background task processor, and serves the REST + SSE API
//! with graceful shutdown.

use serde_json::json;
use std::sync::Arc;

use waypoint_a2a::{
    create_router, A2aConfig, AgentRegistry, ApiError, ApiResult, AppState, BudgetManager,
    SimulatedExecutor, TaskProcessor, TaskStore, UsageTracker,
};
use waypoint_core::{AgentCard, Capability};
use waypoint_telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env("waypoint-a2a", env!("CARGO_PKG_VERSION"));
    init_telemetry(&telemetry_config)
        .map_err(|e| ApiError::internal_error(format!("Failed to initialize telemetry: {}", e)))?;

    let config = A2aConfig::from_env();

    let store = Arc::new(TaskStore::new());
    let agents = Arc::new(AgentRegistry::new());
    let budgets = Arc::new(BudgetManager::new());
    let usage = Arc::new(UsageTracker::new());

    agents.register(research_agent_card())?;
    tracing::info!("Agent card registered");

    for (user_id, limit) in &config.budget_tiers {
        budgets.set_budget(user_id, *limit);
        tracing::info!(user_id = %user_id, monthly_limit_usd = limit, "Budget configured");
    }

    let processor = TaskProcessor::new(
        Arc::clone(&store),
        Arc::new(SimulatedExecutor),
        config.processor_interval,
    );
    let processor_handle = processor.start();

    let state = AppState {
        store,
        agents,
        budgets,
        usage,
        estimated_task_cost: config.estimated_task_cost,
    };
    let app = create_router(state);

    let addr = config.bind_addr()?;
    tracing::info!(%addr, "Starting task service");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    processor_handle.abort();
    shutdown_telemetry();
    Ok(())
}

/// The capability card this deployment advertises.
fn research_agent_card() -> AgentCard {
    AgentCard::new(
        "research-agent",
        "Cost-Controlled Research Assistant",
        env!("CARGO_PKG_VERSION"),
        "An AI research assistant with cost tracking and budget enforcement",
    )
    .with_capability(Capability {
        name: "search_papers".to_string(),
        description: "Search academic papers and research documents".to_string(),
        input_schema: Some(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query for academic papers"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": 10
                }
            },
            "required": ["query"]
        })),
        output_schema: None,
    })
    .with_capability(Capability {
        name: "analyze_code".to_string(),
        description: "Analyze source code for patterns and issues".to_string(),
        input_schema: Some(json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Source code to analyze"
                },
                "language": {
                    "type": "string",
                    "description": "Programming language"
                }
            },
            "required": ["code"]
        })),
        output_schema: None,
    })
    .with_capability(Capability {
        name: "summarize_document".to_string(),
        description: "Generate concise summaries of research documents".to_string(),
        input_schema: Some(json!({
            "type": "object",
            "properties": {
                "document": {
                    "type": "string",
                    "description": "Document text to summarize"
                },
                "max_length": {
                    "type": "integer",
                    "description": "Maximum summary length in words",
                    "default": 200
                }
            },
            "required": ["document"]
        })),
        output_schema: None,
    })
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
