//! Budget Enforcement and Usage Tracking
//!
//! The budget check is an admission decision made *before* a task is
//! created: `check_and_update` performs check-and-reserve in one critical
//! section so two concurrent requests cannot both observe headroom and
//! overspend. When real usage is known, `record_actual_cost` replaces the
//! reservation with the actual figure.
//!
//! Usage records are append-only; the pricing table maps model names to
//! per-1k-token costs with a documented fallback tier for unknown models.

use crate::error::{ApiError, ApiResult};
use chrono::{Months, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use waypoint_core::{TaskId, Timestamp};
use waypoint_telemetry::METRICS;

// ============================================================================
// USAGE RECORDS
// ============================================================================

/// Token usage and cost for a single operation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Usage {
    pub user_id: String,
    pub task_id: TaskId,
    pub model: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    #[schema(value_type = chrono::DateTime<chrono::Utc>)]
    pub timestamp: Timestamp,
}

/// Append-only usage ledger with per-user range queries.
pub struct UsageTracker {
    records: RwLock<Vec<Usage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn record(&self, usage: Usage) {
        let mut records = self.records.write().expect("usage ledger lock");
        records.push(usage);
    }

    /// Usage records for a user within `[start, end]`.
    pub fn usage_for(&self, user_id: &str, start: Timestamp, end: Timestamp) -> Vec<Usage> {
        let records = self.records.read().expect("usage ledger lock");
        records
            .iter()
            .filter(|u| u.user_id == user_id && u.timestamp >= start && u.timestamp <= end)
            .cloned()
            .collect()
    }

    pub fn total_cost(&self, user_id: &str, start: Timestamp, end: Timestamp) -> f64 {
        self.usage_for(user_id, start, end)
            .iter()
            .map(|u| u.cost_usd)
            .sum()
    }

    pub fn total_tokens(&self, user_id: &str, start: Timestamp, end: Timestamp) -> u64 {
        self.usage_for(user_id, start, end)
            .iter()
            .map(|u| u.total_tokens)
            .sum()
    }
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// BUDGETS
// ============================================================================

/// A user's monthly budget state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Budget {
    pub user_id: String,
    pub monthly_limit_usd: f64,
    pub current_spend_usd: f64,
    #[schema(value_type = chrono::DateTime<chrono::Utc>)]
    pub reset_at: Timestamp,
}

impl Budget {
    pub fn remaining_usd(&self) -> f64 {
        (self.monthly_limit_usd - self.current_spend_usd).max(0.0)
    }

    pub fn percent_used(&self) -> f64 {
        if self.monthly_limit_usd == 0.0 {
            return 0.0;
        }
        (self.current_spend_usd / self.monthly_limit_usd) * 100.0
    }
}

/// Per-user budget manager. The whole check-and-reserve runs inside one
/// mutex-held section; that is the invariant that prevents overspend races.
pub struct BudgetManager {
    budgets: Mutex<HashMap<String, Budget>>,
}

impl BudgetManager {
    pub fn new() -> Self {
        Self {
            budgets: Mutex::new(HashMap::new()),
        }
    }

    /// Create or replace a user's budget with a fresh cycle.
    pub fn set_budget(&self, user_id: &str, monthly_limit_usd: f64) {
        let mut budgets = self.budgets.lock().expect("budget lock");
        budgets.insert(
            user_id.to_string(),
            Budget {
                user_id: user_id.to_string(),
                monthly_limit_usd,
                current_spend_usd: 0.0,
                reset_at: next_month(Utc::now()),
            },
        );
    }

    /// Insert a pre-built budget record (e.g. restored state).
    pub fn insert_budget(&self, budget: Budget) {
        let mut budgets = self.budgets.lock().expect("budget lock");
        budgets.insert(budget.user_id.clone(), budget);
    }

    pub fn get(&self, user_id: &str) -> Option<Budget> {
        let mut budgets = self.budgets.lock().expect("budget lock");
        let budget = budgets.get_mut(user_id)?;
        Self::roll_cycle(budget);
        Some(budget.clone())
    }

    /// Admission check with reservation.
    ///
    /// Allowed iff `current_spend + cost <= monthly_limit`; on allow the
    /// cost is added to the spend before the lock is released. A denial
    /// mutates nothing.
    pub fn check_and_update(&self, user_id: &str, cost_usd: f64) -> ApiResult<bool> {
        let mut budgets = self.budgets.lock().expect("budget lock");
        let budget = budgets
            .get_mut(user_id)
            .ok_or_else(|| ApiError::budget_not_configured(user_id))?;

        Self::roll_cycle(budget);

        let allowed = budget.current_spend_usd + cost_usd <= budget.monthly_limit_usd;
        if allowed {
            budget.current_spend_usd += cost_usd;
        }

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_budget_check(allowed);
        }

        Ok(allowed)
    }

    /// Replace an earlier reservation with the actual cost once known:
    /// `spend <- spend - estimate + actual`, floored at zero.
    pub fn record_actual_cost(
        &self,
        user_id: &str,
        estimated_usd: f64,
        actual_usd: f64,
    ) -> ApiResult<()> {
        let mut budgets = self.budgets.lock().expect("budget lock");
        let budget = budgets
            .get_mut(user_id)
            .ok_or_else(|| ApiError::budget_not_configured(user_id))?;

        budget.current_spend_usd =
            (budget.current_spend_usd - estimated_usd + actual_usd).max(0.0);
        Ok(())
    }

    /// Zero the spend and start a new cycle now.
    pub fn reset(&self, user_id: &str) -> ApiResult<()> {
        let mut budgets = self.budgets.lock().expect("budget lock");
        let budget = budgets
            .get_mut(user_id)
            .ok_or_else(|| ApiError::budget_not_configured(user_id))?;

        budget.current_spend_usd = 0.0;
        budget.reset_at = next_month(Utc::now());
        Ok(())
    }

    /// Lazy cycle rollover: once `reset_at` has passed, the spend zeroes
    /// and `reset_at` advances exactly one month per elapsed cycle.
    fn roll_cycle(budget: &mut Budget) {
        let now = Utc::now();
        while budget.reset_at <= now {
            budget.current_spend_usd = 0.0;
            budget.reset_at = next_month(budget.reset_at);
        }
    }
}

impl Default for BudgetManager {
    fn default() -> Self {
        Self::new()
    }
}

fn next_month(from: Timestamp) -> Timestamp {
    from.checked_add_months(Months::new(1))
        .unwrap_or_else(|| from + chrono::Duration::days(30))
}

// ============================================================================
// PRICING
// ============================================================================

/// Per-1k-token pricing for a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub prompt_cost_per_1k: f64,
    pub completion_cost_per_1k: f64,
}

/// The fallback tier applied to unknown models.
pub const DEFAULT_PRICING_MODEL: &str = "gpt-3.5-turbo";

/// Look up pricing for a model; unknown models fall back to the
/// gpt-3.5-turbo tier.
pub fn model_pricing(model: &str) -> ModelPricing {
    match model {
        "gpt-4" => ModelPricing {
            prompt_cost_per_1k: 0.03,
            completion_cost_per_1k: 0.06,
        },
        "gpt-4-turbo" => ModelPricing {
            prompt_cost_per_1k: 0.01,
            completion_cost_per_1k: 0.03,
        },
        "claude-3-opus" => ModelPricing {
            prompt_cost_per_1k: 0.015,
            completion_cost_per_1k: 0.075,
        },
        "claude-3-sonnet" => ModelPricing {
            prompt_cost_per_1k: 0.003,
            completion_cost_per_1k: 0.015,
        },
        _ => ModelPricing {
            prompt_cost_per_1k: 0.0015,
            completion_cost_per_1k: 0.002,
        },
    }
}

/// Cost of a call in USD given its token counts.
pub fn calculate_cost(model: &str, prompt_tokens: u64, completion_tokens: u64) -> f64 {
    let pricing = model_pricing(model);
    (prompt_tokens as f64) * pricing.prompt_cost_per_1k / 1000.0
        + (completion_tokens as f64) * pricing.completion_cost_per_1k / 1000.0
}
