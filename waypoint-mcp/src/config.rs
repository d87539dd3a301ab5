//! Retrieval Service Configuration
//!
//! All configuration is loaded from environment variables with development
//! defaults. Key material has no default: a deployment without a
//! verification key must fail at startup.

use crate::error::{ApiError, ApiResult};
use std::net::SocketAddr;

/// Top-level configuration for the retrieval service.
#[derive(Debug, Clone)]
pub struct McpConfig {
    /// Bind host (default: 0.0.0.0).
    pub bind_host: String,
    /// Bind port (default: 8080).
    pub bind_port: u16,
    /// Counter-store URL (default: redis://localhost:6379).
    pub redis_url: String,
    /// Requests admitted per tenant per window (default: 100).
    pub rate_limit: i64,
    /// Rate-limit window length in seconds (default: 60).
    pub rate_limit_window_secs: u64,
    /// Expected token issuer.
    pub issuer: String,
    /// Expected token audience.
    pub audience: String,
    /// Clock-skew tolerance for token validation, seconds (default: 60).
    pub jwt_leeway_secs: i64,
}

impl McpConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `WAYPOINT_MCP_BIND` / `PORT` or `WAYPOINT_MCP_PORT`
    /// - `WAYPOINT_REDIS_URL`
    /// - `WAYPOINT_RATE_LIMIT` / `WAYPOINT_RATE_LIMIT_WINDOW_SECS`
    /// - `WAYPOINT_JWT_ISSUER` / `WAYPOINT_JWT_AUDIENCE` / `WAYPOINT_JWT_LEEWAY_SECS`
    pub fn from_env() -> Self {
        Self {
            bind_host: std::env::var("WAYPOINT_MCP_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            bind_port: std::env::var("PORT")
                .ok()
                .or_else(|| std::env::var("WAYPOINT_MCP_PORT").ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
            redis_url: std::env::var("WAYPOINT_REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            rate_limit: std::env::var("WAYPOINT_RATE_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            rate_limit_window_secs: std::env::var("WAYPOINT_RATE_LIMIT_WINDOW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            issuer: std::env::var("WAYPOINT_JWT_ISSUER")
                .unwrap_or_else(|_| "waypoint-identity".to_string()),
            audience: std::env::var("WAYPOINT_JWT_AUDIENCE")
                .unwrap_or_else(|_| "waypoint-mcp".to_string()),
            jwt_leeway_secs: std::env::var("WAYPOINT_JWT_LEEWAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
        }
    }

    /// Resolve the socket address to bind.
    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.bind_port);
        addr.parse()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

/// Load the token-verification public key.
///
/// `WAYPOINT_JWT_PUBLIC_KEY` carries the PEM inline;
/// `WAYPOINT_JWT_PUBLIC_KEY_FILE` points at a PEM file. One of the two is
/// required.
pub fn load_public_key_pem() -> ApiResult<String> {
    if let Ok(pem) = std::env::var("WAYPOINT_JWT_PUBLIC_KEY") {
        if !pem.trim().is_empty() {
            return Ok(pem);
        }
    }

    if let Ok(path) = std::env::var("WAYPOINT_JWT_PUBLIC_KEY_FILE") {
        return std::fs::read_to_string(&path).map_err(|e| {
            ApiError::internal_error(format!("Failed to read public key from {}: {}", path, e))
        });
    }

    Err(ApiError::internal_error(
        "Token verification key not configured. Set WAYPOINT_JWT_PUBLIC_KEY or \
         WAYPOINT_JWT_PUBLIC_KEY_FILE.",
    ))
}
