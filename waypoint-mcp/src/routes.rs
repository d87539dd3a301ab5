//! RPC Route and Method Dispatch
//!
//! The retrieval service exposes a single `POST /mcp` endpoint for all
//! JSON-RPC methods, plus unauthenticated `/health/*` probes and the
//! Prometheus `/metrics` endpoint. Any non-POST method on `/mcp` is
//! answered with 405.
//!
//! Dispatch: parse -> validate -> method routing. `initialize` is the only
//! method served without a principal; everything else requires one.

use crate::auth::Principal;
use crate::db::DbClient;
use crate::error::{rpc_error_response, ApiError, ApiResult};
use crate::health;
use crate::mcp::{
    InitializeParams, InitializeResult, ServerCapabilities, ServerInfo, ToolCallParams,
    ToolsCapability, ToolsListResult, MCP_PROTOCOL_VERSION,
};
use crate::middleware::{
    auth_middleware, rate_limit_middleware, AuthState, PrincipalExtractor, RateLimiter,
};
use crate::tools::ToolRegistry;
use axum::{
    body::Bytes,
    extract::State,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use waypoint_core::{RpcRequest, RpcResponse};
use waypoint_telemetry::{metrics_handler, observability_middleware, METRICS};

/// Identity advertised through `initialize`.
pub const SERVER_NAME: &str = "waypoint-mcp";

/// Shared state for the RPC endpoint.
pub struct McpState {
    pub db: DbClient,
    pub registry: ToolRegistry,
}

/// Handler for `POST /mcp`.
///
/// The principal is optional at the extractor level because `initialize`
/// is the pre-auth handshake; `dispatch` enforces it per method.
pub async fn rpc_handler(
    State(state): State<Arc<McpState>>,
    principal: Option<PrincipalExtractor>,
    body: Bytes,
) -> Response {
    let request: RpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => {
            return rpc_error_response(None, ApiError::parse_error("Invalid JSON"));
        }
    };

    if let Err(e) = request.validate() {
        return rpc_error_response(request.id.clone(), ApiError::invalid_request(e.to_string()));
    }

    let id = request.id.clone();
    let principal = principal.map(|PrincipalExtractor(p)| p);
    let result = dispatch(&state, &request, principal.as_ref()).await;

    if let Ok(metrics) = METRICS.as_ref() {
        metrics.record_rpc_request(&request.method, result.is_ok());
    }

    match result {
        Ok(value) => Json(RpcResponse {
            jsonrpc: waypoint_core::JSONRPC_VERSION.to_string(),
            id,
            result: Some(value),
            error: None,
        })
        .into_response(),
        Err(e) => {
            tracing::debug!(method = %request.method, error = %e, "RPC request failed");
            rpc_error_response(id, e)
        }
    }
}

/// Route a validated request to its method handler.
async fn dispatch(
    state: &McpState,
    request: &RpcRequest,
    principal: Option<&Principal>,
) -> ApiResult<JsonValue> {
    match request.method.as_str() {
        "initialize" => handle_initialize(request),
        "tools/list" => {
            require_principal(principal)?;
            handle_tools_list(state)
        }
        "tools/call" => {
            let principal = require_principal(principal)?;
            handle_tools_call(state, request, principal).await
        }
        other => Err(ApiError::method_not_found(other)),
    }
}

/// `initialize` is the handshake and the only unauthenticated method.
fn require_principal(principal: Option<&Principal>) -> ApiResult<&Principal> {
    principal.ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

fn handle_initialize(request: &RpcRequest) -> ApiResult<JsonValue> {
    let params: InitializeParams = request
        .parse_params()
        .map_err(|e| ApiError::invalid_params(format!("Invalid initialize params: {}", e)))?;

    if let Some(client) = &params.client_info {
        tracing::info!(
            client_name = %client.name,
            client_version = %client.version,
            protocol_version = %params.protocol_version,
            "Session initialized"
        );
    }

    let result = InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability { list_changed: false },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    serde_json::to_value(result).map_err(ApiError::from)
}

fn handle_tools_list(state: &McpState) -> ApiResult<JsonValue> {
    let result = ToolsListResult {
        tools: state.registry.list(),
    };
    serde_json::to_value(result).map_err(ApiError::from)
}

async fn handle_tools_call(
    state: &McpState,
    request: &RpcRequest,
    principal: &Principal,
) -> ApiResult<JsonValue> {
    let params: ToolCallParams = request
        .parse_params()
        .map_err(|e| ApiError::invalid_params(format!("Invalid tool call params: {}", e)))?;

    if params.name.is_empty() {
        return Err(ApiError::invalid_params("Tool name is required"));
    }

    tracing::debug!(tool = %params.name, tenant_id = %principal.tenant_id, "Tool call");
    let result = state
        .registry
        .execute(&params.name, params.arguments, principal)
        .await?;

    serde_json::to_value(result).map_err(ApiError::from)
}

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Build the retrieval-service router.
///
/// Middleware order on `/mcp` (execution order): observability -> auth
/// (optional) -> rate limit -> dispatcher. Health and metrics bypass auth
/// and the limiter.
pub fn create_router(
    state: Arc<McpState>,
    auth_state: AuthState,
    limiter: RateLimiter,
) -> Router {
    let rpc = Router::new()
        .route("/mcp", post(rpc_handler))
        .layer(from_fn_with_state(limiter, rate_limit_middleware))
        .layer(from_fn_with_state(auth_state, auth_middleware))
        .with_state(state.clone());

    Router::new()
        .merge(rpc)
        .nest("/health", health::create_router(state.db.clone()))
        .route("/metrics", get(metrics_handler))
        .layer(axum::middleware::from_fn(observability_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, FixedClock, TokenValidator};
    use crate::db::DbConfig;
    use crate::testkeys;
    use crate::tools::{
        HybridSearchTool, ListDocumentsTool, RetrieveDocumentTool, SearchDocumentsTool,
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    const NOW: i64 = 1_704_067_200;
    const TENANT: &str = "11111111-1111-1111-1111-111111111111";

    fn test_router() -> Router {
        let db = DbClient::from_config(&DbConfig::default()).expect("lazy pool");

        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(SearchDocumentsTool::new(db.clone())))
            .expect("register search");
        registry
            .register(Arc::new(RetrieveDocumentTool::new(db.clone())))
            .expect("register retrieve");
        registry
            .register(Arc::new(ListDocumentsTool::new(db.clone())))
            .expect("register list");
        registry
            .register(Arc::new(HybridSearchTool::new(db.clone())))
            .expect("register hybrid");

        let state = Arc::new(McpState { db, registry });

        let validator = TokenValidator::new(AuthConfig {
            public_key_pem: testkeys::PUBLIC_KEY_PEM.to_string(),
            issuer: testkeys::ISSUER.to_string(),
            audience: testkeys::AUDIENCE.to_string(),
            leeway_secs: 0,
            clock: std::sync::Arc::new(FixedClock(NOW)),
        })
        .expect("validator");

        // Counter store is unreachable in unit tests; the limiter fails open.
        let limiter = RateLimiter::new(
            redis::Client::open("redis://127.0.0.1:1").expect("lazy redis client"),
            100,
            60,
        );

        create_router(state, AuthState::new(validator), limiter)
    }

    fn rpc_body(id: JsonValue, method: &str, params: JsonValue) -> String {
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
    }

    async fn post_mcp(router: Router, body: String, token: Option<String>) -> (StatusCode, JsonValue) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/mcp")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let response = router
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .expect("request");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    fn valid_token() -> String {
        testkeys::sign_token(TENANT, "alice", &["read"], NOW + 3600)
    }

    #[tokio::test]
    async fn initialize_works_without_auth() {
        let body = rpc_body(json!(1), "initialize", json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "0.0.1"}
        }));
        let (status, value) = post_mcp(test_router(), body, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(value["result"]["serverInfo"]["name"], "waypoint-mcp");
        assert_eq!(
            value["result"]["capabilities"]["tools"]["listChanged"],
            false
        );
    }

    #[tokio::test]
    async fn tools_list_without_auth_is_401() {
        let body = rpc_body(json!(2), "tools/list", json!({}));
        let (status, value) = post_mcp(test_router(), body, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(value["error"]["code"], -32001);
    }

    #[tokio::test]
    async fn tools_list_with_auth_returns_all_tools() {
        let body = rpc_body(json!(3), "tools/list", json!({}));
        let (status, value) = post_mcp(test_router(), body, Some(valid_token())).await;

        assert_eq!(status, StatusCode::OK);
        let tools = value["result"]["tools"].as_array().expect("tools array");
        let names: Vec<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();
        assert_eq!(
            names,
            vec![
                "hybrid_search",
                "list_documents",
                "retrieve_document",
                "search_documents"
            ]
        );
        for tool in tools {
            assert!(tool["inputSchema"].is_object());
            assert!(tool["description"].is_string());
        }
    }

    #[tokio::test]
    async fn unknown_method_is_rpc_error_with_http_200() {
        let body = rpc_body(json!(4), "prompts/list", json!({}));
        let (status, value) = post_mcp(test_router(), body, Some(valid_token())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["error"]["code"], -32601);
        assert_eq!(value["id"], 4);
    }

    #[tokio::test]
    async fn malformed_json_is_parse_error_with_http_200() {
        let (status, value) = post_mcp(test_router(), "{not json".to_string(), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn wrong_version_is_invalid_request() {
        let body =
            json!({"jsonrpc": "1.0", "id": 5, "method": "initialize"}).to_string();
        let (status, value) = post_mcp(test_router(), body, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn unknown_tool_maps_to_404() {
        let body = rpc_body(
            json!(6),
            "tools/call",
            json!({"name": "no_such_tool", "arguments": {}}),
        );
        let (status, value) = post_mcp(test_router(), body, Some(valid_token())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(value["error"]["code"], -32004);
    }

    #[tokio::test]
    async fn tool_validation_failure_maps_to_400() {
        let body = rpc_body(
            json!(7),
            "tools/call",
            json!({"name": "search_documents", "arguments": {"query": ""}}),
        );
        let (status, value) = post_mcp(test_router(), body, Some(valid_token())).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(value["error"]["code"], -32005);
    }

    #[tokio::test]
    async fn get_on_rpc_endpoint_is_405() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/mcp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn health_ping_needs_no_auth() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/health/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .expect("request");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
