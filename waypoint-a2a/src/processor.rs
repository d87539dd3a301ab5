//! Background Task Processor
//!
//! Scans the store for pending tasks on an interval and drives each
//! through running to a terminal state, publishing events at every
//! transition. Each task executes on its own spawned tokio task, so tasks
//! run concurrently with each other while a single task stays sequential.
//!
//! Cancellation is cooperative: a task cancelled between transitions makes
//! the next transition illegal, which the processor treats as "someone
//! else finished this task" and logs rather than propagates.

use crate::store::TaskStore;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use waypoint_core::Task;

/// Executes one capability invocation for a task.
#[async_trait]
pub trait CapabilityExecutor: Send + Sync {
    /// Run the task's capability; `Ok` carries the result payload,
    /// `Err` the failure message.
    async fn execute(&self, task: &Task) -> Result<JsonValue, String>;
}

/// Demo executor: simulates a 2-4s capability run with a ~90% success
/// rate, both derived deterministically from the task id.
pub struct SimulatedExecutor;

#[async_trait]
impl CapabilityExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task) -> Result<JsonValue, String> {
        let seed = task.id.as_uuid().as_bytes()[0];
        let execution_secs = 2 + u64::from(seed % 3);
        tokio::time::sleep(Duration::from_secs(execution_secs)).await;

        if seed % 10 == 0 {
            return Err("Simulated task failure".to_string());
        }

        Ok(json!({
            "status": "success",
            "capability": task.capability,
            "message": "Task completed successfully",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "cost": 0.01,
        }))
    }
}

/// Interval-driven drain of pending tasks.
#[derive(Clone)]
pub struct TaskProcessor {
    store: Arc<TaskStore>,
    executor: Arc<dyn CapabilityExecutor>,
    interval: Duration,
}

impl TaskProcessor {
    pub fn new(
        store: Arc<TaskStore>,
        executor: Arc<dyn CapabilityExecutor>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            executor,
            interval,
        }
    }

    /// Spawn the scan loop. Abort the returned handle to stop it; tasks
    /// already in flight run to completion.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let processor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(processor.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(
                interval_ms = processor.interval.as_millis() as u64,
                "Task processor started"
            );

            loop {
                ticker.tick().await;
                processor.process_pending();
            }
        })
    }

    /// One scan: spawn an execution for every pending task.
    pub fn process_pending(&self) {
        for task in self.store.pending() {
            let processor = self.clone();
            tokio::spawn(async move {
                processor.process_task(task).await;
            });
        }
    }

    /// Drive one task from pending to a terminal state.
    pub async fn process_task(&self, task: Task) {
        let id = task.id;

        let running = match self.store.start(id, "Task started") {
            Ok(task) => task,
            Err(e) => {
                // Lost the race: cancelled, or another worker picked it up.
                tracing::debug!(task_id = %id, error = %e, "Skipping task");
                return;
            }
        };

        tracing::info!(task_id = %id, capability = %running.capability, "Task started");

        match self.executor.execute(&running).await {
            Ok(result) => {
                match self
                    .store
                    .complete(id, result, "Task completed successfully")
                {
                    Ok(_) => tracing::info!(task_id = %id, "Task completed"),
                    Err(e) => {
                        tracing::debug!(task_id = %id, error = %e, "Completion superseded")
                    }
                }
            }
            Err(message) => match self.store.fail(id, message) {
                Ok(_) => tracing::warn!(task_id = %id, "Task failed"),
                Err(e) => tracing::debug!(task_id = %id, error = %e, "Failure superseded"),
            },
        }
    }
}
