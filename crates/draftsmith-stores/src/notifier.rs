//! TaskNotifier - realtime lifecycle event fan-out.
//!
//! The notifier is a hint, not a guarantee: delivery is at-least-once at
//! best, and subscribers may lag or miss events entirely. The runtime's
//! periodic catch-up scan is the correctness backstop, so publishing with
//! no subscribers is not an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use draftsmith_core::store::StoreError;
use draftsmith_core::types::{StageName, TaskId};

/// What happened to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEventKind {
    /// A new task was persisted and is waiting to be claimed
    Created,
    /// One stage of a claimed task completed
    StageCompleted { stage: StageName },
    /// The task reached completed
    Completed,
    /// The task reached failed
    Failed,
}

/// A task lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    /// Task the event belongs to
    pub task_id: TaskId,
    /// What happened
    pub kind: TaskEventKind,
    /// When it happened
    pub at: DateTime<Utc>,
}

impl TaskEvent {
    /// Create an event for a task.
    pub fn new(task_id: impl Into<TaskId>, kind: TaskEventKind) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            at: Utc::now(),
        }
    }

    /// Convenience: a task_created event.
    pub fn created(task_id: impl Into<TaskId>) -> Self {
        Self::new(task_id, TaskEventKind::Created)
    }

    /// Convenience: a stage_completed event.
    pub fn stage_completed(task_id: impl Into<TaskId>, stage: StageName) -> Self {
        Self::new(task_id, TaskEventKind::StageCompleted { stage })
    }

    /// Convenience: a completed event.
    pub fn completed(task_id: impl Into<TaskId>) -> Self {
        Self::new(task_id, TaskEventKind::Completed)
    }

    /// Convenience: a failed event.
    pub fn failed(task_id: impl Into<TaskId>) -> Self {
        Self::new(task_id, TaskEventKind::Failed)
    }
}

/// TaskNotifier trait - fire-and-forget publish/subscribe for lifecycle
/// events. Handlers must be idempotent: at-least-once is the only delivery
/// guarantee.
#[async_trait]
pub trait TaskNotifier: Send + Sync {
    /// Publish an event to all active subscribers.
    async fn publish(&self, event: TaskEvent) -> Result<(), StoreError>;

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<TaskEvent>;
}

/// In-process notifier backed by a tokio broadcast channel.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TaskEvent>,
    capacity: usize,
}

impl BroadcastNotifier {
    /// Create a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Return the configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl TaskNotifier for BroadcastNotifier {
    async fn publish(&self, event: TaskEvent) -> Result<(), StoreError> {
        // "No receiver" is a non-error; the catch-up scan covers it.
        match self.tx.send(event) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}
