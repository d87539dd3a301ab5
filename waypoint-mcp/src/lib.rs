//! WAYPOINT Retrieval Service
//!
//! JSON-RPC 2.0 tool-calling over multi-tenant hybrid search. One
//! `POST /mcp` endpoint dispatches `initialize`, `tools/list`, and
//! `tools/call`; tools run against a tenant-scoped PostgreSQL façade
//! whose row visibility is enforced by the database itself. Admission is
//! governed by a Redis-backed per-tenant rate limiter that fails open on
//! counter-store faults.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod mcp;
pub mod middleware;
pub mod routes;
pub mod tools;

#[cfg(test)]
pub mod testkeys;

// Re-export commonly used types
pub use auth::{AuthConfig, Principal, SystemClock, TokenValidator};
pub use config::{load_public_key_pem, McpConfig};
pub use db::{DbClient, DbConfig, NewDocument};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{AuthState, PrincipalExtractor, RateLimiter};
pub use routes::{create_router, McpState};
pub use tools::{
    HybridSearchTool, ListDocumentsTool, RetrieveDocumentTool, SearchDocumentsTool, ToolHandler,
    ToolRegistry,
};
