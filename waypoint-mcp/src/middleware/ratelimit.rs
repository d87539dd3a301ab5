//! Per-Tenant Rate Limiting
//!
//! Fixed-window counter held in Redis so the admission decision is shared
//! across replicas. Key format: `ratelimit:<tenant_id>:<window_index>`
//! with `window_index = floor(now_seconds / window_seconds)`. The
//! increment-then-conditional-expire pair runs as one server-side script.
//!
//! A fixed window admits up to 2x the ceiling across a window boundary;
//! that burst is an accepted property of this limiter.
//!
//! The limiter fails open: if the counter store is unreachable the request
//! is allowed and a warning plus a metric are emitted. A cache outage must
//! not become a total service outage. Requests without a principal (the
//! pre-auth handshake) bypass the limiter entirely.

use super::RpcReject;
use crate::auth::Principal;
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use redis::Script;
use std::sync::Arc;
use waypoint_core::TenantId;
use waypoint_telemetry::METRICS;

const INCR_EXPIRE_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied { retry_after_secs: u64 },
}

/// Redis-backed fixed-window rate limiter keyed on tenant identity.
#[derive(Clone)]
pub struct RateLimiter {
    client: redis::Client,
    limit: i64,
    window_secs: u64,
    script: Arc<Script>,
}

impl RateLimiter {
    pub fn new(client: redis::Client, limit: i64, window_secs: u64) -> Self {
        Self {
            client,
            limit,
            window_secs,
            script: Arc::new(Script::new(INCR_EXPIRE_SCRIPT)),
        }
    }

    /// The window a given epoch-second falls into.
    pub fn window_index(now_secs: i64, window_secs: u64) -> i64 {
        now_secs / window_secs as i64
    }

    /// Counter key for a tenant at a point in time.
    pub fn counter_key(tenant_id: TenantId, now_secs: i64, window_secs: u64) -> String {
        format!(
            "ratelimit:{}:{}",
            tenant_id,
            Self::window_index(now_secs, window_secs)
        )
    }

    /// Check whether the tenant may proceed in the current window.
    pub async fn check(&self, tenant_id: TenantId) -> RateDecision {
        let now = chrono::Utc::now().timestamp();
        let key = Self::counter_key(tenant_id, now, self.window_secs);

        let count: i64 = match self.run_script(&key).await {
            Ok(count) => count,
            Err(e) => {
                // Fail open: the counter store being down is an
                // infrastructure fault, not a semantic denial.
                tracing::warn!(error = %e, tenant_id = %tenant_id, "Rate limit check failed, allowing request");
                if let Ok(metrics) = METRICS.as_ref() {
                    metrics.record_rate_limit("error");
                }
                return RateDecision::Allowed;
            }
        };

        if count <= self.limit {
            if let Ok(metrics) = METRICS.as_ref() {
                metrics.record_rate_limit("allowed");
            }
            RateDecision::Allowed
        } else {
            if let Ok(metrics) = METRICS.as_ref() {
                metrics.record_rate_limit("denied");
            }
            tracing::info!(
                tenant_id = %tenant_id,
                count,
                limit = self.limit,
                "Rate limit exceeded"
            );
            RateDecision::Denied {
                retry_after_secs: self.window_secs,
            }
        }
    }

    async fn run_script(&self, key: &str) -> Result<i64, redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.script
            .key(key)
            .arg(self.window_secs)
            .invoke_async(&mut conn)
            .await
    }
}

/// Admission middleware for the RPC endpoint.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, RpcReject> {
    let Some(principal) = request.extensions().get::<Principal>() else {
        // Pre-auth traffic is not tenant-attributable; it bypasses the
        // limiter and is bounded by method-level auth instead.
        return Ok(next.run(request).await);
    };

    match limiter.check(principal.tenant_id).await {
        RateDecision::Allowed => Ok(next.run(request).await),
        RateDecision::Denied { retry_after_secs } => {
            Err(RpcReject(ApiError::too_many_requests(retry_after_secs)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tenant() -> TenantId {
        TenantId::new(Uuid::nil())
    }

    #[test]
    fn window_index_is_floor_division() {
        assert_eq!(RateLimiter::window_index(0, 60), 0);
        assert_eq!(RateLimiter::window_index(59, 60), 0);
        assert_eq!(RateLimiter::window_index(60, 60), 1);
        assert_eq!(RateLimiter::window_index(121, 60), 2);
    }

    #[test]
    fn counter_key_format() {
        let key = RateLimiter::counter_key(tenant(), 120, 60);
        assert_eq!(key, "ratelimit:00000000-0000-0000-0000-000000000000:2");
    }

    #[test]
    fn requests_in_same_window_share_a_key() {
        let a = RateLimiter::counter_key(tenant(), 60, 60);
        let b = RateLimiter::counter_key(tenant(), 119, 60);
        assert_eq!(a, b);

        let c = RateLimiter::counter_key(tenant(), 120, 60);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn unreachable_store_fails_open() {
        // Nothing listens on port 1; the check must allow the request.
        let client = redis::Client::open("redis://127.0.0.1:1").expect("client builds lazily");
        let limiter = RateLimiter::new(client, 3, 60);
        assert_eq!(limiter.check(tenant()).await, RateDecision::Allowed);
    }
}
