//! Property-Based Tests for the Task Lifecycle and Budget Invariants
//!
//! 1. Any sequence of attempted transitions walks the state machine
//!    legally: once terminal, nothing mutates and `completed_at` is set
//!    exactly at the first terminal entry.
//! 2. The sum of successful budget reservations within a cycle never
//!    exceeds the monthly limit.

use proptest::prelude::*;
use serde_json::json;
use waypoint_a2a::{BudgetManager, TaskStore};
use waypoint_core::{Task, TaskState};

// ============================================================================
// STRATEGIES
// ============================================================================

fn target_state_strategy() -> impl Strategy<Value = TaskState> {
    prop_oneof![
        Just(TaskState::Running),
        Just(TaskState::Completed),
        Just(TaskState::Failed),
        Just(TaskState::Cancelled),
    ]
}

fn apply_target(store: &TaskStore, id: waypoint_core::TaskId, target: TaskState) -> bool {
    match target {
        TaskState::Running => store.start(id, "go").is_ok(),
        TaskState::Completed => store.complete(id, json!({"ok": true}), "done").is_ok(),
        TaskState::Failed => store.fail(id, "boom").is_ok(),
        TaskState::Cancelled => store.cancel(id, "stop").is_ok(),
        TaskState::Pending => false,
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn observed_states_walk_the_machine(
        targets in proptest::collection::vec(target_state_strategy(), 1..12)
    ) {
        let store = TaskStore::new();
        let task = Task::new("agent", "cap", json!({}));
        let id = task.id;
        store.create(task).expect("create");

        let mut observed = vec![TaskState::Pending];
        let mut terminal_snapshot: Option<Task> = None;

        for target in targets {
            let before = store.get(id).expect("task");
            let applied = apply_target(&store, id, target);
            let after = store.get(id).expect("task");

            if applied {
                // Every accepted transition is legal from the prior state.
                prop_assert!(before.state.can_transition(target));
                prop_assert_eq!(after.state, target);
                observed.push(after.state);

                if target.is_terminal() {
                    prop_assert_eq!(after.completed_at, Some(after.updated_at));
                    terminal_snapshot = Some(after.clone());
                }
            } else {
                // A rejected transition mutates nothing.
                prop_assert_eq!(&after, &before);
            }

            // Terminal tasks never change again.
            if let Some(snapshot) = &terminal_snapshot {
                prop_assert_eq!(&after, snapshot);
            }
        }

        // The observed sequence is a prefix of a valid walk: pending,
        // optionally running, optionally one terminal state.
        prop_assert!(observed.len() <= 3);
        prop_assert_eq!(observed[0], TaskState::Pending);
        if observed.len() == 3 {
            prop_assert_eq!(observed[1], TaskState::Running);
            prop_assert!(observed[2].is_terminal());
        }
        if observed.len() == 2 {
            prop_assert!(
                observed[1] == TaskState::Running || observed[1].is_terminal()
            );
        }
    }

    #[test]
    fn reservations_never_exceed_the_limit(
        limit_cents in 1u32..500,
        costs_cents in proptest::collection::vec(1u32..50, 1..60),
    ) {
        let manager = BudgetManager::new();
        let limit = f64::from(limit_cents) / 100.0;
        manager.set_budget("user", limit);

        let mut reserved = 0.0f64;
        for cost_cents in costs_cents {
            let cost = f64::from(cost_cents) / 100.0;
            if manager.check_and_update("user", cost).expect("budget exists") {
                reserved += cost;
            }
        }

        prop_assert!(reserved <= limit + 1e-9);
        let budget = manager.get("user").expect("budget");
        prop_assert!((budget.current_spend_usd - reserved).abs() < 1e-9);
    }
}
