//! Task store contract
//!
//! The durable record of tasks. The runtime consumes this trait only; the
//! in-memory implementation lives in draftsmith-stores. The one invariant
//! everything else leans on: `claim_next_pending` hands a given task to at
//! most one caller, ever.

use async_trait::async_trait;
use chrono::Duration;
use thiserror::Error;

use crate::types::{
    ExecutionPlan, Intent, QualityScore, StageResult, Task, TaskId, TaskStatus,
};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("illegal status transition for task {task_id}: {from} -> {to}")]
    IllegalTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task {0} is terminal and immutable")]
    Terminal(TaskId),

    #[error("internal store error: {0}")]
    Internal(String),
}

/// TaskStore trait - atomic create/read/update over durable task records.
///
/// Implementations must make every method atomic with respect to each
/// other; the claim operation is the serialization point for the whole
/// executor fleet.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new pending task for the intent/plan pair.
    async fn create(&self, intent: Intent, plan: ExecutionPlan) -> Result<TaskId, StoreError>;

    /// Atomically claim the oldest pending task, flipping it to
    /// in_progress. Returns None when nothing is pending. At most one
    /// caller ever receives a given task.
    async fn claim_next_pending(&self) -> Result<Option<Task>, StoreError>;

    /// Append one stage attempt to the task's result log and advance its
    /// stage index.
    async fn append_stage_result(
        &self,
        task_id: &str,
        result: StageResult,
    ) -> Result<(), StoreError>;

    /// Move the task to a new status, enforcing the legal transitions.
    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError>;

    /// Attach (or replace) the latest quality verdict.
    async fn set_quality(&self, task_id: &str, quality: QualityScore) -> Result<(), StoreError>;

    /// Record the terminal error message on a task.
    async fn set_error(&self, task_id: &str, error: String) -> Result<(), StoreError>;

    /// Increment the task-global refinement counter, returning the new
    /// value.
    async fn record_refinement(&self, task_id: &str) -> Result<u32, StoreError>;

    /// Fetch a task by id.
    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// List tasks in the given status.
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;

    /// Release in_progress tasks that have not been touched for
    /// `older_than` back to pending (orphan recovery after a worker
    /// crash). Returns the ids of the reclaimed tasks.
    async fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<TaskId>, StoreError>;
}
