//! Task Service REST + SSE Routes
//!
//! | Method | Path              | Effect                                   |
//! |--------|-------------------|------------------------------------------|
//! | GET    | /agent            | Registered agent card                    |
//! | POST   | /tasks            | Create task after budget reserve (201)   |
//! | GET    | /tasks            | List tasks (agent_id, limit, offset)     |
//! | GET    | /tasks/:id        | Task record                              |
//! | DELETE | /tasks/:id        | Cancel if non-terminal; 409 if terminal  |
//! | GET    | /tasks/:id/events | Server-sent events stream                |
//! | GET    | /health           | Liveness probe                           |
//!
//! Every route except the SSE stream sits behind a 15s request timeout;
//! the stream lives as long as the client stays connected.

use crate::agents::AgentRegistry;
use crate::budget::{BudgetManager, UsageTracker};
use crate::error::{ApiError, ApiResult};
use crate::store::TaskStore;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware::from_fn,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::timeout::TimeoutLayer;
use waypoint_core::{clamp_limit, AgentCard, Task, TaskId, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use waypoint_telemetry::{metrics_handler, observability_middleware, METRICS};

// ============================================================================
// STATE
// ============================================================================

/// Shared application state for the task service.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub agents: Arc<AgentRegistry>,
    pub budgets: Arc<BudgetManager>,
    pub usage: Arc<UsageTracker>,
    /// Pre-flight reservation per task, in USD.
    pub estimated_task_cost: f64,
}

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// Body of `POST /tasks`.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct CreateTaskRequest {
    pub user_id: String,
    pub agent_id: String,
    pub capability: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub input: JsonValue,
}

/// Query parameters of `GET /tasks`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListTasksQuery {
    pub agent_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthBody {
    pub status: String,
    pub service: String,
    pub version: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /agent - the registered agent card.
#[utoipa::path(
    get,
    path = "/agent",
    tag = "Agent",
    responses(
        (status = 200, description = "The registered agent card", body = AgentCard),
        (status = 404, description = "No agent registered", body = ApiError),
    ),
)]
pub async fn get_agent(State(state): State<AppState>) -> ApiResult<Json<AgentCard>> {
    state
        .agents
        .list()
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::agent_not_found("default"))
}

/// POST /tasks - create a task after the budget reserve.
///
/// The budget check happens before the record exists: a denial means the
/// task is never created.
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "Tasks",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created in pending state", body = Task),
        (status = 400, description = "Validation failure or missing budget", body = ApiError),
        (status = 402, description = "Budget exceeded", body = ApiError),
        (status = 404, description = "Unknown agent or capability", body = ApiError),
    ),
)]
pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    if req.user_id.is_empty() {
        return Err(ApiError::missing_field("user_id"));
    }
    if req.agent_id.is_empty() {
        return Err(ApiError::missing_field("agent_id"));
    }
    if req.capability.is_empty() {
        return Err(ApiError::missing_field("capability"));
    }

    let agent = state
        .agents
        .get(&req.agent_id)
        .ok_or_else(|| ApiError::agent_not_found(&req.agent_id))?;
    if !agent.has_capability(&req.capability) {
        return Err(ApiError::capability_not_found(&req.agent_id, &req.capability));
    }

    let allowed = state
        .budgets
        .check_and_update(&req.user_id, state.estimated_task_cost)?;
    if !allowed {
        let remaining = state
            .budgets
            .get(&req.user_id)
            .map(|b| b.remaining_usd())
            .unwrap_or(0.0);
        tracing::info!(user_id = %req.user_id, "Task creation denied by budget");
        return Err(ApiError::budget_exceeded(remaining));
    }

    let task = Task::new(req.agent_id, req.capability, req.input);
    state.store.create(task.clone())?;

    tracing::info!(task_id = %task.id, agent_id = %task.agent_id, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /tasks - list tasks.
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "Tasks, newest first", body = [Task]),
    ),
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
) -> Json<Vec<Task>> {
    let limit = clamp_limit(
        query.limit.unwrap_or(0),
        DEFAULT_LIST_LIMIT,
        MAX_LIST_LIMIT,
    ) as usize;
    let offset = query.offset.unwrap_or(0).max(0) as usize;

    Json(state.store.list(query.agent_id.as_deref(), limit, offset))
}

/// GET /tasks/:id - a single task record.
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = TaskId, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "The task", body = Task),
        (status = 404, description = "Unknown task", body = ApiError),
    ),
)]
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    state
        .store
        .get(id)
        .map(Json)
        .ok_or_else(|| ApiError::task_not_found(id))
}

/// DELETE /tasks/:id - cancel a non-terminal task.
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "Tasks",
    params(("id" = TaskId, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "The cancelled task", body = Task),
        (status = 404, description = "Unknown task", body = ApiError),
        (status = 409, description = "Task already terminal", body = ApiError),
    ),
)]
pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    if state.store.get(id).is_none() {
        return Err(ApiError::task_not_found(id));
    }

    let task = state.store.cancel(id, "Cancelled by user")?;
    tracing::info!(task_id = %id, "Task cancelled");
    Ok(Json(task))
}

/// GET /tasks/:id/events - stream task events as SSE.
///
/// The subscription is removed when the client disconnects or the stream
/// is otherwise dropped.
pub async fn task_events(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> ApiResult<Response> {
    if state.store.get(id).is_none() {
        return Err(ApiError::task_not_found(id));
    }

    let subscription = state.store.subscribe(id);
    if let Ok(metrics) = METRICS.as_ref() {
        metrics.sse_opened();
    }
    let guard = SubscriptionGuard {
        store: Arc::clone(&state.store),
        task_id: id,
        subscription_id: subscription.id,
    };

    let stream = ReceiverStream::new(subscription.receiver).map(move |event| {
        // The guard rides inside the stream; dropping the stream
        // unsubscribes.
        let _hold = &guard;
        Event::default().json_data(&event)
    });

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    // Disable proxy-side buffering so events flush per write.
    headers.insert(
        header::HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );

    Ok(response)
}

/// Removes the subscription when the SSE stream is dropped.
struct SubscriptionGuard {
    store: Arc<TaskStore>,
    task_id: TaskId,
    subscription_id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.store.unsubscribe(self.task_id, self.subscription_id);
        if let Ok(metrics) = METRICS.as_ref() {
            metrics.sse_closed();
        }
        tracing::debug!(task_id = %self.task_id, "SSE subscription closed");
    }
}

/// GET /health - liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is alive", body = HealthBody)),
)]
pub async fn health() -> Json<HealthBody> {
    Json(HealthBody {
        status: "healthy".to_string(),
        service: "waypoint-a2a".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn openapi_json() -> impl IntoResponse {
    use utoipa::OpenApi;
    Json(crate::openapi::ApiDoc::openapi())
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the task-service router.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/agent", get(get_agent))
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/:id", get(get_task).delete(cancel_task))
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_json))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(15)));

    // The SSE route carries no request timeout: the stream lives until
    // the client disconnects.
    let streaming = Router::new().route("/tasks/:id/events", get(task_events));

    Router::new()
        .merge(api)
        .merge(streaming)
        .layer(from_fn(observability_middleware))
        .with_state(state)
}
