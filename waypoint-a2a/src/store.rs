//! In-Memory Task Store with Subscriber Fan-Out
//!
//! One lock protects both the task map and the subscriber map: state
//! transitions serialize through it, and the event for a transition is
//! enqueued to every subscriber's buffer inside the same critical section.
//! A subscriber therefore observes events for a task in transition order,
//! and no transition can interleave between a state change and its event.
//!
//! Publishing never blocks: each subscriber has a bounded buffer and a
//! full buffer drops the event for that subscriber only. A slow consumer
//! costs itself events, never the publisher or its peers.

use crate::error::{ApiError, ApiResult};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;
use waypoint_core::{Task, TaskEvent, TaskId, TaskState};
use waypoint_telemetry::METRICS;

/// Buffer depth of each subscriber channel.
pub const SUBSCRIBER_BUFFER: usize = 10;

/// A live subscription to one task's events.
///
/// Dropping the receiver closes the channel; the store prunes closed
/// subscribers on the next publish. Explicit [`TaskStore::unsubscribe`]
/// removes the entry eagerly.
pub struct Subscription {
    pub id: u64,
    pub task_id: TaskId,
    pub receiver: mpsc::Receiver<TaskEvent>,
}

struct Inner {
    tasks: HashMap<TaskId, Task>,
    subscribers: HashMap<TaskId, Vec<(u64, mpsc::Sender<TaskEvent>)>>,
    next_subscription_id: u64,
}

/// Process-local task store.
pub struct TaskStore {
    inner: RwLock<Inner>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                tasks: HashMap::new(),
                subscribers: HashMap::new(),
                next_subscription_id: 0,
            }),
        }
    }

    // ========================================================================
    // RECORD OPERATIONS
    // ========================================================================

    /// Insert a new task. The id must be unused.
    pub fn create(&self, task: Task) -> ApiResult<()> {
        let mut inner = self.inner.write().expect("task store lock");
        if inner.tasks.contains_key(&task.id) {
            return Err(ApiError::already_exists("Task", task.id));
        }
        inner.tasks.insert(task.id, task);
        Ok(())
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        let inner = self.inner.read().expect("task store lock");
        inner.tasks.get(&id).cloned()
    }

    /// List tasks, newest first, optionally filtered by agent.
    pub fn list(&self, agent_id: Option<&str>, limit: usize, offset: usize) -> Vec<Task> {
        let inner = self.inner.read().expect("task store lock");
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| agent_id.map_or(true, |a| t.agent_id == a))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks.into_iter().skip(offset).take(limit).collect()
    }

    /// All tasks currently pending, oldest first (drain order).
    pub fn pending(&self) -> Vec<Task> {
        let inner = self.inner.read().expect("task store lock");
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Pending)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    // ========================================================================
    // STATE TRANSITIONS
    // ========================================================================

    /// Transition a task to running and publish the event.
    pub fn start(&self, id: TaskId, message: impl Into<String>) -> ApiResult<Task> {
        self.apply(id, Some(message.into()), None, |task| {
            task.transition(TaskState::Running)
        })
    }

    /// Transition a task to completed with its result and publish.
    pub fn complete(
        &self,
        id: TaskId,
        result: JsonValue,
        message: impl Into<String>,
    ) -> ApiResult<Task> {
        let data = result.clone();
        self.apply(id, Some(message.into()), Some(data), move |task| {
            task.complete(result)
        })
    }

    /// Transition a task to failed and publish.
    pub fn fail(&self, id: TaskId, error: impl Into<String>) -> ApiResult<Task> {
        let error = error.into();
        let message = error.clone();
        self.apply(id, Some(message), None, move |task| task.fail(error))
    }

    /// Transition a task to cancelled and publish.
    pub fn cancel(&self, id: TaskId, reason: impl Into<String>) -> ApiResult<Task> {
        let reason = reason.into();
        self.apply(id, Some("Task cancelled".to_string()), None, move |task| {
            task.cancel(reason)
        })
    }

    /// Run a transition under the write lock and fan out its event before
    /// the lock is released.
    fn apply<F>(
        &self,
        id: TaskId,
        message: Option<String>,
        data: Option<JsonValue>,
        mutate: F,
    ) -> ApiResult<Task>
    where
        F: FnOnce(&mut Task) -> Result<(), waypoint_core::TransitionError>,
    {
        let mut inner = self.inner.write().expect("task store lock");
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| ApiError::task_not_found(id))?;

        mutate(task).map_err(|e| ApiError::state_conflict(e.to_string()))?;
        let snapshot = task.clone();

        if let Ok(metrics) = METRICS.as_ref() {
            metrics.record_task_transition(&snapshot.state.to_string());
        }

        let event = TaskEvent {
            task_id: id,
            state: snapshot.state,
            message,
            data,
            // The terminal event's timestamp is the instant completed_at
            // was stamped.
            timestamp: snapshot.updated_at,
        };
        Self::publish_locked(&mut inner, event);

        Ok(snapshot)
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Open a buffered subscription to a task's events.
    pub fn subscribe(&self, task_id: TaskId) -> Subscription {
        let mut inner = self.inner.write().expect("task store lock");
        let id = inner.next_subscription_id;
        inner.next_subscription_id += 1;

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        inner.subscribers.entry(task_id).or_default().push((id, tx));

        Subscription {
            id,
            task_id,
            receiver: rx,
        }
    }

    /// Remove a subscription; empty subscriber lists are collected.
    pub fn unsubscribe(&self, task_id: TaskId, subscription_id: u64) {
        let mut inner = self.inner.write().expect("task store lock");
        if let Some(subs) = inner.subscribers.get_mut(&task_id) {
            subs.retain(|(id, _)| *id != subscription_id);
            if subs.is_empty() {
                inner.subscribers.remove(&task_id);
            }
        }
    }

    /// Number of live subscribers for a task.
    pub fn subscriber_count(&self, task_id: TaskId) -> usize {
        let inner = self.inner.read().expect("task store lock");
        inner.subscribers.get(&task_id).map_or(0, |s| s.len())
    }

    /// Non-blocking fan-out. Full buffers drop the event for that
    /// subscriber; closed channels are pruned.
    fn publish_locked(inner: &mut Inner, event: TaskEvent) {
        let Some(subs) = inner.subscribers.get_mut(&event.task_id) else {
            return;
        };

        subs.retain(|(id, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    task_id = %event.task_id,
                    subscription_id = id,
                    "Subscriber buffer full, dropping event"
                );
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if subs.is_empty() {
            inner.subscribers.remove(&event.task_id);
        }
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_task() -> Task {
        Task::new("research-agent", "search_papers", json!({"query": "rust"}))
    }

    #[test]
    fn create_then_get() {
        let store = TaskStore::new();
        let task = new_task();
        let id = task.id;
        store.create(task.clone()).expect("create");

        let fetched = store.get(id).expect("task exists");
        assert_eq!(fetched.state, TaskState::Pending);
        assert_eq!(fetched, task);
    }

    #[test]
    fn duplicate_create_fails() {
        let store = TaskStore::new();
        let task = new_task();
        store.create(task.clone()).expect("first create");
        let err = store.create(task).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::AlreadyExists);
    }

    #[test]
    fn list_filters_and_paginates() {
        let store = TaskStore::new();
        for i in 0..5 {
            let agent = if i % 2 == 0 { "even" } else { "odd" };
            store
                .create(Task::new(agent, "cap", json!({})))
                .expect("create");
        }

        assert_eq!(store.list(None, 100, 0).len(), 5);
        assert_eq!(store.list(Some("even"), 100, 0).len(), 3);
        assert_eq!(store.list(Some("odd"), 100, 0).len(), 2);
        assert_eq!(store.list(None, 2, 0).len(), 2);
        assert_eq!(store.list(None, 100, 4).len(), 1);
        assert!(store.list(None, 100, 99).is_empty());
    }

    #[test]
    fn list_is_newest_first() {
        let store = TaskStore::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let task = new_task();
            ids.push(task.id);
            store.create(task).expect("create");
            std::thread::sleep(std::time::Duration::from_millis(2));
        }

        let listed = store.list(None, 10, 0);
        let listed_ids: Vec<TaskId> = listed.iter().map(|t| t.id).collect();
        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(listed_ids, expected);
    }

    #[test]
    fn lifecycle_happy_path_publishes_in_order() {
        let store = TaskStore::new();
        let task = new_task();
        let id = task.id;
        store.create(task).expect("create");

        let mut sub = store.subscribe(id);

        store.start(id, "Task started").expect("start");
        store
            .complete(id, json!({"status": "success"}), "Task completed")
            .expect("complete");

        let first = sub.receiver.try_recv().expect("running event");
        assert_eq!(first.state, TaskState::Running);
        let second = sub.receiver.try_recv().expect("completed event");
        assert_eq!(second.state, TaskState::Completed);
        assert!(second.timestamp >= first.timestamp);

        // Terminal event timestamp matches completed_at.
        let final_task = store.get(id).expect("task");
        assert_eq!(final_task.completed_at, Some(second.timestamp));
    }

    #[test]
    fn illegal_transition_is_state_conflict() {
        let store = TaskStore::new();
        let task = new_task();
        let id = task.id;
        store.create(task).expect("create");

        // pending -> completed skips running
        let err = store
            .complete(id, json!({}), "nope")
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::StateConflict);
    }

    #[test]
    fn cancel_terminal_task_is_rejected_without_mutation() {
        let store = TaskStore::new();
        let task = new_task();
        let id = task.id;
        store.create(task).expect("create");
        store.start(id, "go").expect("start");
        store.fail(id, "boom").expect("fail");

        let before = store.get(id).expect("task");
        let err = store.cancel(id, "too late").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::StateConflict);
        assert_eq!(store.get(id).expect("task"), before);
    }

    #[test]
    fn slow_subscriber_drops_events_but_never_blocks() {
        let store = TaskStore::new();

        // Drive many transitions across many tasks all feeding one
        // subscriber's task plus a fast peer.
        let task = new_task();
        let id = task.id;
        store.create(task).expect("create");

        let mut slow = store.subscribe(id);
        let mut fast = store.subscribe(id);

        // Fill beyond the slow subscriber's buffer with synthetic events.
        {
            let mut inner = store.inner.write().expect("lock");
            for i in 0..(SUBSCRIBER_BUFFER + 5) {
                let event = TaskEvent {
                    task_id: id,
                    state: TaskState::Running,
                    message: Some(format!("event {}", i)),
                    data: None,
                    timestamp: chrono::Utc::now(),
                };
                TaskStore::publish_locked(&mut inner, event.clone());
                // The fast subscriber consumes immediately.
                let received = fast.receiver.try_recv().expect("fast subscriber keeps up");
                assert_eq!(received.message, event.message);
            }
        }

        // The slow subscriber holds exactly its buffer depth; the overflow
        // was dropped for it alone.
        let mut received = 0;
        while slow.receiver.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, SUBSCRIBER_BUFFER);
    }

    #[test]
    fn unsubscribe_collects_empty_lists() {
        let store = TaskStore::new();
        let task = new_task();
        let id = task.id;
        store.create(task).expect("create");

        let sub_a = store.subscribe(id);
        let sub_b = store.subscribe(id);
        assert_eq!(store.subscriber_count(id), 2);

        store.unsubscribe(id, sub_a.id);
        assert_eq!(store.subscriber_count(id), 1);

        store.unsubscribe(id, sub_b.id);
        assert_eq!(store.subscriber_count(id), 0);
        assert!(store
            .inner
            .read()
            .expect("lock")
            .subscribers
            .get(&id)
            .is_none());
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let store = TaskStore::new();
        let task = new_task();
        let id = task.id;
        store.create(task).expect("create");

        let sub = store.subscribe(id);
        drop(sub.receiver);
        assert_eq!(store.subscriber_count(id), 1);

        store.start(id, "go").expect("start");
        assert_eq!(store.subscriber_count(id), 0);
    }

    #[test]
    fn events_only_reach_their_tasks_subscribers() {
        let store = TaskStore::new();
        let task_a = new_task();
        let task_b = new_task();
        let (id_a, id_b) = (task_a.id, task_b.id);
        store.create(task_a).expect("create a");
        store.create(task_b).expect("create b");

        let mut sub_b = store.subscribe(id_b);
        store.start(id_a, "go").expect("start a");

        assert!(sub_b.receiver.try_recv().is_err());
    }
}
