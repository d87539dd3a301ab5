//! Task Service Configuration

use crate::error::{ApiError, ApiResult};
use std::net::SocketAddr;
use std::time::Duration;

/// Top-level configuration for the task service.
#[derive(Debug, Clone)]
pub struct A2aConfig {
    /// Bind host (default: 0.0.0.0).
    pub bind_host: String,
    /// Bind port (default: 8081).
    pub bind_port: u16,
    /// Background processor scan interval (default: 1s).
    pub processor_interval: Duration,
    /// Pre-flight cost reservation per task in USD (default: 0.01).
    pub estimated_task_cost: f64,
    /// Budget tiers as `(user_id, monthly_limit_usd)` pairs.
    pub budget_tiers: Vec<(String, f64)>,
}

impl A2aConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `WAYPOINT_A2A_BIND` / `PORT` or `WAYPOINT_A2A_PORT`
    /// - `WAYPOINT_PROCESSOR_INTERVAL_MS` (default: 1000)
    /// - `WAYPOINT_TASK_COST_ESTIMATE` (default: 0.01)
    /// - `WAYPOINT_BUDGET_TIERS`: comma-separated `user:limit` pairs,
    ///   e.g. `"demo-user-basic:10,demo-user-pro:50,demo-user-enterprise:200"`
    pub fn from_env() -> Self {
        Self {
            bind_host: std::env::var("WAYPOINT_A2A_BIND").unwrap_or_else(|_| "0.0.0.0".to_string()),
            bind_port: std::env::var("PORT")
                .ok()
                .or_else(|| std::env::var("WAYPOINT_A2A_PORT").ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(8081),
            processor_interval: Duration::from_millis(
                std::env::var("WAYPOINT_PROCESSOR_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            estimated_task_cost: std::env::var("WAYPOINT_TASK_COST_ESTIMATE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.01),
            budget_tiers: std::env::var("WAYPOINT_BUDGET_TIERS")
                .map(|raw| parse_budget_tiers(&raw))
                .unwrap_or_else(|_| default_budget_tiers()),
        }
    }

    pub fn bind_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.bind_host, self.bind_port);
        addr.parse()
            .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
    }
}

/// Parse `user:limit` pairs; malformed entries are skipped with a warning.
fn parse_budget_tiers(raw: &str) -> Vec<(String, f64)> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (user, limit) = entry.split_once(':')?;
            match limit.trim().parse::<f64>() {
                Ok(limit) if !user.trim().is_empty() => Some((user.trim().to_string(), limit)),
                _ => {
                    tracing::warn!(entry, "Skipping malformed budget tier entry");
                    None
                }
            }
        })
        .collect()
}

/// Demo tiers used when no tier table is configured.
fn default_budget_tiers() -> Vec<(String, f64)> {
    vec![
        ("demo-user-basic".to_string(), 10.0),
        ("demo-user-pro".to_string(), 50.0),
        ("demo-user-enterprise".to_string(), 200.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_budget_tiers() {
        let tiers = parse_budget_tiers("alice:10,bob:50.5");
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0], ("alice".to_string(), 10.0));
        assert_eq!(tiers[1], ("bob".to_string(), 50.5));
    }

    #[test]
    fn skips_malformed_tier_entries() {
        let tiers = parse_budget_tiers("alice:10,broken,:5,carol:not-a-number, dave:1 ");
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].0, "alice");
        assert_eq!(tiers[1].0, "dave");
    }

    #[test]
    fn default_tiers_exist() {
        let tiers = default_budget_tiers();
        assert_eq!(tiers.len(), 3);
        assert!(tiers.iter().any(|(u, _)| u == "demo-user-pro"));
    }
}
