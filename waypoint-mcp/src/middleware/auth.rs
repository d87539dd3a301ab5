//! Optional-Authentication Middleware
//!
//! Validates the `Authorization` header when present and injects the
//! resulting [`Principal`] into request extensions. A missing header
//! passes through untouched: `initialize` is served without a principal,
//! and the dispatcher rejects every other method that lacks one. A header
//! that is present but invalid always fails the request.

use super::RpcReject;
use crate::auth::{Principal, TokenValidator};
use crate::error::ApiError;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Shared state for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub validator: Arc<TokenValidator>,
}

impl AuthState {
    pub fn new(validator: TokenValidator) -> Self {
        Self {
            validator: Arc::new(validator),
        }
    }
}

/// Validate the bearer token if one is offered.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, RpcReject> {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .map(str::to_owned);

    if let Some(header) = auth_header {
        let principal = state.validator.validate(&header).map_err(RpcReject)?;
        tracing::debug!(
            tenant_id = %principal.tenant_id,
            user_id = %principal.user_id,
            "Request authenticated"
        );
        request.extensions_mut().insert(principal);
    }

    Ok(next.run(request).await)
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed extractor for the authenticated principal.
///
/// Implements `FromRequestParts`, so handlers that require authentication
/// can take it directly in their signature. The rejection is the standard
/// JSON-RPC authentication-required error (HTTP 401). Wrap it in `Option`
/// for endpoints where a principal is optional (the `initialize`
/// handshake).
#[derive(Debug, Clone)]
pub struct PrincipalExtractor(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PrincipalExtractor
where
    S: Send + Sync,
{
    type Rejection = RpcReject;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(PrincipalExtractor)
            .ok_or_else(|| RpcReject(ApiError::unauthorized("Authentication required")))
    }
}

impl std::ops::Deref for PrincipalExtractor {
    type Target = Principal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, FixedClock};
    use crate::testkeys;
    use axum::{body::Body, http::{Request, StatusCode}, middleware, routing::get, Router};
    use tower::ServiceExt;

    const NOW: i64 = 1_704_067_200;
    const TENANT: &str = "11111111-1111-1111-1111-111111111111";

    fn test_validator() -> TokenValidator {
        TokenValidator::new(AuthConfig {
            public_key_pem: testkeys::PUBLIC_KEY_PEM.to_string(),
            issuer: testkeys::ISSUER.to_string(),
            audience: testkeys::AUDIENCE.to_string(),
            leeway_secs: 0,
            clock: Arc::new(FixedClock(NOW)),
        })
        .expect("validator")
    }

    fn test_app() -> Router {
        async fn handler(principal: Option<PrincipalExtractor>) -> String {
            match principal {
                Some(PrincipalExtractor(p)) => format!("tenant={}", p.tenant_id),
                None => "anonymous".to_string(),
            }
        }

        Router::new()
            .route("/probe", get(handler))
            .layer(middleware::from_fn_with_state(
                AuthState::new(test_validator()),
                auth_middleware,
            ))
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        String::from_utf8(bytes.to_vec()).expect("utf8 body")
    }

    #[tokio::test]
    async fn missing_header_passes_through_without_principal() {
        let response = test_app()
            .oneshot(Request::builder().uri("/probe").body(Body::empty()).unwrap())
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "anonymous");
    }

    #[tokio::test]
    async fn valid_token_injects_principal() {
        let token = testkeys::sign_token(TENANT, "alice", &["read"], NOW + 3600);
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/probe")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, format!("tenant={}", TENANT));
    }

    #[tokio::test]
    async fn invalid_token_is_rejected_with_rpc_error() {
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/probe")
                    .header("authorization", "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_string(response).await;
        assert!(body.contains("-32001"), "body should carry the rpc code: {}", body);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let token = testkeys::sign_token(TENANT, "alice", &["read"], NOW - 120);
        let response = test_app()
            .oneshot(
                Request::builder()
                    .uri("/probe")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn required_extractor_rejects_anonymous_requests() {
        // A handler taking the extractor outright requires a principal.
        async fn handler(principal: PrincipalExtractor) -> String {
            // Deref gives direct access to the principal's fields.
            principal.user_id.clone()
        }

        let app = Router::new()
            .route("/protected", get(handler))
            .layer(middleware::from_fn_with_state(
                AuthState::new(test_validator()),
                auth_middleware,
            ));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let token = testkeys::sign_token(TENANT, "alice", &["read"], NOW + 3600);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/protected")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "alice");
    }
}
