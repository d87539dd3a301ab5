//! OpenAPI document for the task service REST surface.

use utoipa::OpenApi;

use crate::budget::{Budget, Usage};
use crate::error::{ApiError, ErrorCode};
use crate::routes::{CreateTaskRequest, HealthBody};
use waypoint_core::{AgentCard, Capability, Task, TaskEvent, TaskState};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Waypoint Task Service",
        description = "REST + SSE surface for long-running agent capabilities with per-user budget enforcement"
    ),
    paths(
        crate::routes::get_agent,
        crate::routes::create_task,
        crate::routes::list_tasks,
        crate::routes::get_task,
        crate::routes::cancel_task,
        crate::routes::health,
    ),
    components(schemas(
        AgentCard,
        ApiError,
        Budget,
        Capability,
        CreateTaskRequest,
        ErrorCode,
        HealthBody,
        Task,
        TaskEvent,
        TaskState,
        Usage,
    )),
    tags(
        (name = "Agent", description = "Agent card discovery"),
        (name = "Tasks", description = "Task lifecycle"),
        (name = "Health", description = "Probes"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_builds_and_lists_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.as_str() == "/tasks"));
        assert!(paths.iter().any(|p| p.as_str() == "/tasks/{id}"));
        assert!(paths.iter().any(|p| p.as_str() == "/agent"));
    }
}
