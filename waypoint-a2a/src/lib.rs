//! WAYPOINT Task Service
//!
//! REST + SSE surface for long-running agent capabilities. Tasks move
//! through a strict state machine (pending -> running -> terminal) inside
//! an in-memory store that fans events out to per-connection subscriber
//! buffers; admission is governed by per-user monthly budgets with
//! reserve-then-reconcile semantics.

pub mod agents;
pub mod budget;
pub mod config;
pub mod error;
pub mod openapi;
pub mod processor;
pub mod routes;
pub mod store;

// Re-export commonly used types
pub use agents::AgentRegistry;
pub use budget::{
    calculate_cost, model_pricing, Budget, BudgetManager, ModelPricing, Usage, UsageTracker,
};
pub use config::A2aConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use processor::{CapabilityExecutor, SimulatedExecutor, TaskProcessor};
pub use routes::{create_router, AppState, CreateTaskRequest};
pub use store::{Subscription, TaskStore, SUBSCRIBER_BUFFER};
