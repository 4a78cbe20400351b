//! TaskStore in-memory implementation.
//!
//! All mutations go through a single RwLock, which makes every store method
//! atomic with respect to the others. `claim_next_pending` does its
//! conditional pending -> in_progress flip under the write lock, which is
//! what gives the fleet its at-most-one-claim guarantee.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use draftsmith_core::store::{StoreError, TaskStore};
use draftsmith_core::types::{
    ExecutionPlan, Intent, QualityScore, StageResult, Task, TaskId, TaskStatus,
};

const DEFAULT_IN_MEMORY_TASK_LIMIT: usize = 5_000;

/// In-memory implementation for development and testing.
pub struct InMemoryTaskStore {
    inner: RwLock<Inner>,
    max_tasks: usize,
}

struct Inner {
    tasks: HashMap<TaskId, Task>,
    /// Pending claim order, oldest first.
    pending: VecDeque<TaskId>,
}

impl InMemoryTaskStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::with_max_tasks(DEFAULT_IN_MEMORY_TASK_LIMIT)
    }

    /// Create a new in-memory store with a hard capacity limit.
    pub fn with_max_tasks(max_tasks: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                tasks: HashMap::new(),
                pending: VecDeque::new(),
            }),
            max_tasks: max_tasks.max(1),
        }
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Inner>, StoreError> {
        self.inner
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))
    }
}

impl Inner {
    fn get_mut(&mut self, task_id: &str) -> Result<&mut Task, StoreError> {
        self.tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::NotFound(task_id.to_string()))
    }

    fn evict_oldest_terminal(&mut self) {
        let oldest = self
            .tasks
            .values()
            .filter(|t| t.status.is_terminal())
            .min_by_key(|t| t.updated_at)
            .map(|t| t.id.clone());
        if let Some(id) = oldest {
            self.tasks.remove(&id);
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, intent: Intent, plan: ExecutionPlan) -> Result<TaskId, StoreError> {
        let task = Task::new(intent, plan);
        let task_id = task.id.clone();

        let mut inner = self.write()?;
        if inner.tasks.len() >= self.max_tasks {
            inner.evict_oldest_terminal();
        }
        inner.pending.push_back(task_id.clone());
        inner.tasks.insert(task_id.clone(), task);
        Ok(task_id)
    }

    async fn claim_next_pending(&self) -> Result<Option<Task>, StoreError> {
        let mut inner = self.write()?;
        // The conditional flip happens under the write lock; a task that is
        // no longer pending (already claimed, reclaimed elsewhere, evicted)
        // is simply skipped.
        while let Some(task_id) = inner.pending.pop_front() {
            if let Some(task) = inner.tasks.get_mut(&task_id) {
                if task.status == TaskStatus::Pending {
                    task.status = TaskStatus::InProgress;
                    task.touch();
                    return Ok(Some(task.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn append_stage_result(
        &self,
        task_id: &str,
        result: StageResult,
    ) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let task = inner.get_mut(task_id)?;
        if task.status.is_terminal() {
            return Err(StoreError::Terminal(task_id.to_string()));
        }
        task.record_stage_result(result);
        Ok(())
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let task = inner.get_mut(task_id)?;
        if !task.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                task_id: task_id.to_string(),
                from: task.status,
                to: status,
            });
        }
        task.status = status;
        task.touch();
        if status == TaskStatus::Pending {
            inner.pending.push_back(task_id.to_string());
        }
        Ok(())
    }

    async fn set_quality(&self, task_id: &str, quality: QualityScore) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let task = inner.get_mut(task_id)?;
        if task.status.is_terminal() {
            return Err(StoreError::Terminal(task_id.to_string()));
        }
        task.quality = Some(quality);
        task.touch();
        Ok(())
    }

    async fn set_error(&self, task_id: &str, error: String) -> Result<(), StoreError> {
        let mut inner = self.write()?;
        let task = inner.get_mut(task_id)?;
        task.error = Some(error);
        task.touch();
        Ok(())
    }

    async fn record_refinement(&self, task_id: &str) -> Result<u32, StoreError> {
        let mut inner = self.write()?;
        let task = inner.get_mut(task_id)?;
        if task.status.is_terminal() {
            return Err(StoreError::Terminal(task_id.to_string()));
        }
        task.refinement_count += 1;
        task.touch();
        Ok(task.refinement_count)
    }

    async fn get(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let inner = self.read()?;
        Ok(inner.tasks.get(task_id).cloned())
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let inner = self.read()?;
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn reclaim_stale(&self, older_than: Duration) -> Result<Vec<TaskId>, StoreError> {
        let cutoff = Utc::now() - older_than;
        let mut inner = self.write()?;

        let stale: Vec<TaskId> = inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::InProgress && t.updated_at < cutoff)
            .map(|t| t.id.clone())
            .collect();

        for task_id in &stale {
            if let Some(task) = inner.tasks.get_mut(task_id) {
                task.status = TaskStatus::Pending;
                task.touch();
            }
            inner.pending.push_back(task_id.clone());
        }
        Ok(stale)
    }
}
