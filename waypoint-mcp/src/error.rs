//! Error Types for the Retrieval Service
//!
//! One `ApiError` type flows from tool execution and storage up to the RPC
//! dispatcher. Every `ErrorCode` knows two mappings:
//! - `rpc_code()` into the JSON-RPC integer taxonomy carried in response
//!   bodies, and
//! - `status_code()` into the HTTP status the transport reports.
//!
//! Protocol-layer failures (malformed envelope, unknown method) return
//! HTTP 200 with the error in the body: the HTTP exchange succeeded, the
//! RPC did not. Application failures map to semantic statuses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use waypoint_core::rpc::{codes, RpcError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Categories of retrieval-service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ------------------------------------------------------------------
    // Protocol (JSON-RPC grammar) - HTTP 200
    // ------------------------------------------------------------------
    /// Request body was not valid JSON.
    ParseError,
    /// Envelope violates the JSON-RPC 2.0 grammar.
    InvalidRequest,
    /// No such RPC method.
    MethodNotFound,
    /// Method params failed to decode.
    InvalidParams,

    // ------------------------------------------------------------------
    // Authentication / authorization - HTTP 401
    // ------------------------------------------------------------------
    /// No credentials on a method that requires them.
    Unauthorized,
    /// Credentials valid but scope insufficient.
    Forbidden,
    /// Token malformed or signature invalid.
    InvalidToken,
    /// Token expired.
    TokenExpired,

    // ------------------------------------------------------------------
    // Admission - HTTP 429
    // ------------------------------------------------------------------
    /// Tenant exceeded its request budget for the window.
    TooManyRequests,

    // ------------------------------------------------------------------
    // Validation - HTTP 400
    // ------------------------------------------------------------------
    /// Tool arguments failed validation.
    ValidationFailed,
    /// A required argument is missing.
    MissingField,
    /// An argument has the wrong shape.
    InvalidInput,

    // ------------------------------------------------------------------
    // Not found - HTTP 404
    // ------------------------------------------------------------------
    /// The entity does not exist (or belongs to another tenant).
    EntityNotFound,

    // ------------------------------------------------------------------
    // Server - HTTP 5xx
    // ------------------------------------------------------------------
    /// Storage operation failed.
    DatabaseError,
    /// Connection pool exhausted or closed.
    ServiceUnavailable,
    /// Anything else.
    InternalError,
}

impl ErrorCode {
    /// The HTTP status the transport reports for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Protocol errors: the HTTP transport succeeded.
            ErrorCode::ParseError
            | ErrorCode::InvalidRequest
            | ErrorCode::MethodNotFound
            | ErrorCode::InvalidParams => StatusCode::OK,

            ErrorCode::Unauthorized
            | ErrorCode::Forbidden
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::ValidationFailed | ErrorCode::MissingField | ErrorCode::InvalidInput => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,

            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The JSON-RPC error code carried in the response body.
    pub fn rpc_code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => codes::PARSE_ERROR,
            ErrorCode::InvalidRequest => codes::INVALID_REQUEST,
            ErrorCode::MethodNotFound => codes::METHOD_NOT_FOUND,
            ErrorCode::InvalidParams => codes::INVALID_PARAMS,

            ErrorCode::Unauthorized | ErrorCode::InvalidToken | ErrorCode::TokenExpired => {
                codes::AUTHENTICATION_REQUIRED
            }
            ErrorCode::Forbidden => codes::AUTHORIZATION_FAILED,

            ErrorCode::TooManyRequests => codes::RATE_LIMIT_EXCEEDED,

            ErrorCode::ValidationFailed | ErrorCode::MissingField | ErrorCode::InvalidInput => {
                codes::VALIDATION_ERROR
            }

            ErrorCode::EntityNotFound => codes::RESOURCE_NOT_FOUND,

            ErrorCode::DatabaseError | ErrorCode::InternalError => codes::INTERNAL_ERROR,
            ErrorCode::ServiceUnavailable => codes::SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error carried through tool execution and storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
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

    /// Render as a JSON-RPC error object.
    ///
    /// Messages never carry stack traces, internal identifiers, or data
    /// from other tenants; `details` is passed through only when set
    /// deliberately (e.g. `{"retry_after": 60}`).
    pub fn to_rpc_error(&self) -> RpcError {
        let mut err = RpcError::new(self.code.rpc_code(), self.message.clone());
        if let Some(details) = &self.details {
            err = err.with_data(details.clone());
        }
        err
    }

    // ------------------------------------------------------------------
    // Convenience constructors
    // ------------------------------------------------------------------

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::new(ErrorCode::TokenExpired, "Authentication token has expired")
    }

    pub fn too_many_requests(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::TooManyRequests,
            format!("Rate limit exceeded. Retry after {} seconds", retry_after_secs),
        )
        .with_details(serde_json::json!({ "retry_after": retry_after_secs }))
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

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
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

// ============================================================================
// CONVERSIONS FROM UNDERLYING ERRORS
// ============================================================================

/// Database driver errors are logged in full and surfaced generically so
/// driver detail never reaches a client.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!(error = ?err, "Database error");
        ApiError::database_error("Database operation failed")
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!(error = ?err, "Connection pool error");
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                ApiError::service_unavailable("Database connection pool exhausted")
            }
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::invalid_params(format!("Invalid JSON: {}", err))
    }
}

impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_input(format!("Invalid UUID: {}", err))
    }
}

/// Result type used throughout the retrieval service.
pub type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// RPC RESPONSE SHAPING
// ============================================================================

/// Render an [`ApiError`] as a full HTTP response carrying a JSON-RPC
/// error body. Rate-limit denials additionally echo the window size in a
/// `Retry-After` header.
pub fn rpc_error_response(id: Option<JsonValue>, err: ApiError) -> Response {
    use axum::http::header::RETRY_AFTER;
    use waypoint_core::RpcResponse;

    let status = err.status_code();
    let retry_after = match err.code {
        ErrorCode::TooManyRequests => err
            .details
            .as_ref()
            .and_then(|d| d.get("retry_after"))
            .and_then(|v| v.as_u64()),
        _ => None,
    };

    let body = RpcResponse::failure(id, err.to_rpc_error());
    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = retry_after {
        if let Ok(value) = secs.to_string().parse() {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
    }
    response
}
