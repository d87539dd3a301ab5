//! Task lifecycle model and agent cards
//!
//! The task state machine admits exactly these transitions:
//!
//! ```text
//! pending   -> running, cancelled
//! running   -> completed, failed, cancelled
//! completed -> (terminal)
//! failed    -> (terminal)
//! cancelled -> (terminal)
//! ```
//!
//! Once a task is terminal no field mutates; `completed_at` is stamped at
//! the instant of the first terminal transition.

use crate::identity::TaskId;
use crate::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

// ============================================================================
// TASK STATE
// ============================================================================

/// The lifecycle state of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition(&self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Pending, Running) | (Pending, Cancelled) | (Running, Completed) | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal task transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: TaskState,
    pub to: TaskState,
}

// ============================================================================
// TASK RECORD
// ============================================================================

/// A unit of agent work tracked by the task service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Task {
    pub id: TaskId,
    pub agent_id: String,
    pub capability: String,
    #[schema(value_type = Object)]
    pub input: JsonValue,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[schema(value_type = chrono::DateTime<chrono::Utc>)]
    pub created_at: Timestamp,
    #[schema(value_type = chrono::DateTime<chrono::Utc>)]
    pub updated_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<chrono::DateTime<chrono::Utc>>)]
    pub completed_at: Option<Timestamp>,
}

impl Task {
    /// Create a fresh pending task.
    pub fn new(agent_id: impl Into<String>, capability: impl Into<String>, input: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            agent_id: agent_id.into(),
            capability: capability.into(),
            input,
            state: TaskState::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply a state transition, stamping `updated_at` and, on the first
    /// terminal entry, `completed_at`. Illegal transitions leave the task
    /// untouched.
    pub fn transition(&mut self, to: TaskState) -> Result<(), TransitionError> {
        if !self.state.can_transition(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        let now = Utc::now();
        self.state = to;
        self.updated_at = now;
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Transition to completed with a result payload.
    pub fn complete(&mut self, result: JsonValue) -> Result<(), TransitionError> {
        self.transition(TaskState::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    /// Transition to failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(TaskState::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Transition to cancelled, recording the reason.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(TaskState::Cancelled)?;
        self.error = Some(reason.into());
        Ok(())
    }
}

// ============================================================================
// TASK EVENTS
// ============================================================================

/// A real-time task update delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<JsonValue>,
    #[schema(value_type = chrono::DateTime<chrono::Utc>)]
    pub timestamp: Timestamp,
}

impl TaskEvent {
    pub fn new(task_id: TaskId, state: TaskState, message: impl Into<Option<String>>) -> Self {
        Self {
            task_id,
            state,
            message: message.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }
}

// ============================================================================
// AGENT CARDS
// ============================================================================

/// A named operation an agent exposes, with declared schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Capability {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub input_schema: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub output_schema: Option<JsonValue>,
}

/// An agent's identity and advertised capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AgentCard {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub capabilities: Vec<Capability>,
}

impl AgentCard {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: version.into(),
            description: description.into(),
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL_STATES: [TaskState; 5] = [
        TaskState::Pending,
        TaskState::Running,
        TaskState::Completed,
        TaskState::Failed,
        TaskState::Cancelled,
    ];

    #[test]
    fn terminal_states() {
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }

    #[test]
    fn transition_table_is_exact() {
        use TaskState::*;
        let legal = [
            (Pending, Running),
            (Pending, Cancelled),
            (Running, Completed),
            (Running, Failed),
            (Running, Cancelled),
        ];

        for from in ALL_STATES {
            for to in ALL_STATES {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition(to),
                    expected,
                    "{:?} -> {:?} legality mismatch",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn terminal_states_admit_nothing() {
        for from in ALL_STATES.iter().filter(|s| s.is_terminal()) {
            for to in ALL_STATES {
                assert!(!from.can_transition(to));
            }
        }
    }

    #[test]
    fn new_task_is_pending() {
        let task = Task::new("agent-1", "summarize_document", json!({"document": "..."}));
        assert_eq!(task.state, TaskState::Pending);
        assert!(task.completed_at.is_none());
        assert!(task.result.is_none());
        assert_eq!(task.created_at, task.updated_at);
    }

    #[test]
    fn complete_sets_result_and_completed_at() {
        let mut task = Task::new("agent-1", "cap", json!({}));
        task.transition(TaskState::Running).expect("pending -> running");
        assert!(task.completed_at.is_none());

        task.complete(json!({"status": "success"})).expect("running -> completed");
        assert_eq!(task.state, TaskState::Completed);
        assert_eq!(task.result, Some(json!({"status": "success"})));
        let completed_at = task.completed_at.expect("completed_at stamped");
        assert_eq!(completed_at, task.updated_at);
    }

    #[test]
    fn terminal_tasks_reject_mutation() {
        let mut task = Task::new("agent-1", "cap", json!({}));
        task.transition(TaskState::Running).expect("to running");
        task.fail("boom").expect("to failed");

        let before = task.clone();
        let err = task.cancel("too late").unwrap_err();
        assert_eq!(err.from, TaskState::Failed);
        assert_eq!(err.to, TaskState::Cancelled);
        assert_eq!(task, before, "terminal task must not mutate");
    }

    #[test]
    fn cancel_from_pending() {
        let mut task = Task::new("agent-1", "cap", json!({}));
        task.cancel("user request").expect("pending -> cancelled");
        assert_eq!(task.state, TaskState::Cancelled);
        assert_eq!(task.error.as_deref(), Some("user request"));
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskState::Pending).expect("serialize"),
            "\"pending\""
        );
        assert_eq!(
            serde_json::from_str::<TaskState>("\"cancelled\"").expect("parse"),
            TaskState::Cancelled
        );
    }

    #[test]
    fn agent_card_capabilities() {
        let card = AgentCard::new("research-1", "Research Assistant", "1.0.0", "desc")
            .with_capability(Capability {
                name: "search_papers".to_string(),
                description: "Search academic papers".to_string(),
                input_schema: Some(json!({"type": "object"})),
                output_schema: None,
            });

        assert!(card.has_capability("search_papers"));
        assert!(!card.has_capability("unknown"));
    }

    #[test]
    fn event_round_trip() {
        let event = TaskEvent::new(TaskId::generate(), TaskState::Running, Some("Task started".to_string()))
            .with_data(json!({"attempt": 1}));
        let wire = serde_json::to_string(&event).expect("serialize");
        let back: TaskEvent = serde_json::from_str(&wire).expect("parse");
        assert_eq!(event, back);
    }
}
