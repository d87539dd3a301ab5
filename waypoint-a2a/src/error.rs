//! Error Types for the Task Service
//!
//! REST-shaped error taxonomy. Budget denials map to 402 Payment Required
//! so a denial is distinguishable from validation failure; cancelling a
//! terminal task maps to 409 Conflict.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Categories of task-service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request body or query failed validation.
    ValidationFailed,
    /// Required field missing from the request.
    MissingField,
    /// Field value has the wrong shape.
    InvalidInput,

    /// Requested agent is not registered.
    AgentNotFound,
    /// Requested task does not exist.
    TaskNotFound,
    /// The agent does not expose the requested capability.
    CapabilityNotFound,

    /// An entity with the same identifier already exists.
    AlreadyExists,
    /// Operation conflicts with the entity's current state.
    StateConflict,

    /// No budget configured for the user.
    BudgetNotConfigured,
    /// The budget reserve was denied.
    BudgetExceeded,

    /// The response writer cannot stream.
    StreamingUnsupported,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationFailed
            | ErrorCode::MissingField
            | ErrorCode::InvalidInput
            | ErrorCode::BudgetNotConfigured => StatusCode::BAD_REQUEST,

            ErrorCode::BudgetExceeded => StatusCode::PAYMENT_REQUIRED,

            ErrorCode::AgentNotFound | ErrorCode::TaskNotFound | ErrorCode::CapabilityNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::AlreadyExists | ErrorCode::StateConflict => StatusCode::CONFLICT,

            ErrorCode::StreamingUnsupported | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured error body returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<JsonValue>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn agent_not_found(agent_id: &str) -> Self {
        Self::new(
            ErrorCode::AgentNotFound,
            format!("Agent '{}' not found", agent_id),
        )
    }

    pub fn task_not_found(task_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task {} not found", task_id),
        )
    }

    pub fn capability_not_found(agent_id: &str, capability: &str) -> Self {
        Self::new(
            ErrorCode::CapabilityNotFound,
            format!("Agent '{}' has no capability '{}'", agent_id, capability),
        )
    }

    pub fn already_exists(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("{} {} already exists", entity_type, id),
        )
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    pub fn budget_not_configured(user_id: &str) -> Self {
        Self::new(
            ErrorCode::BudgetNotConfigured,
            format!("No budget configured for user '{}'", user_id),
        )
    }

    pub fn budget_exceeded(remaining: f64) -> Self {
        Self::new(ErrorCode::BudgetExceeded, "Budget exceeded")
            .with_details(serde_json::json!({ "remaining_usd": remaining }))
    }

    pub fn streaming_unsupported() -> Self {
        Self::new(
            ErrorCode::StreamingUnsupported,
            "Response writer does not support streaming",
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ErrorCode::BudgetExceeded.status_code(), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(ErrorCode::StateConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TaskNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::AgentNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::ValidationFailed.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::BudgetNotConfigured.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::StreamingUnsupported.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn budget_exceeded_carries_remaining() {
        let err = ApiError::budget_exceeded(0.005);
        assert_eq!(err.details.expect("details")["remaining_usd"], 0.005);
    }

    #[test]
    fn serialization_round_trip() {
        let err = ApiError::task_not_found("a1b2");
        let json = serde_json::to_string(&err).expect("serialize");
        assert!(json.contains("TASK_NOT_FOUND"));
        let back: ApiError = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, err);
    }
}
