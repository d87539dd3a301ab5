//! Request middleware for the RPC endpoint
//!
//! Execution order on `POST /mcp`: observability -> auth (optional) ->
//! rate limit -> dispatcher. Authentication is optional at this layer
//! because `initialize` is served without a principal; every other method
//! enforces one at dispatch.

pub mod auth;
pub mod ratelimit;

pub use auth::{auth_middleware, AuthState, PrincipalExtractor};
pub use ratelimit::{rate_limit_middleware, RateDecision, RateLimiter};

use crate::error::{rpc_error_response, ApiError};
use axum::response::{IntoResponse, Response};

/// Middleware rejection rendered as a JSON-RPC error body.
///
/// Middleware runs before the envelope is parsed, so the request id is not
/// known and the error carries a null id.
#[derive(Debug)]
pub struct RpcReject(pub ApiError);

impl IntoResponse for RpcReject {
    fn into_response(self) -> Response {
        rpc_error_response(None, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header::RETRY_AFTER, StatusCode};

    #[test]
    fn reject_carries_rpc_error_body_shape() {
        let response = RpcReject(ApiError::unauthorized("Authorization header required"))
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn rate_limit_reject_sets_retry_after_header() {
        let response = RpcReject(ApiError::too_many_requests(60)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("60")
        );
    }
}
