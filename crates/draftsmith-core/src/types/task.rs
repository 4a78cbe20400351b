//! Task type definitions
//!
//! Task is the central persisted entity: the intent that started it, the
//! plan being executed, the state machine, and the append-only record of
//! every stage attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use super::{ExecutionPlan, Intent, QualityScore, StageName};

/// Type alias for Task ID
pub type TaskId = String;

/// Task state machine: pending -> in_progress -> {completed, failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, waiting to be claimed
    Pending,
    /// Claimed by exactly one worker
    InProgress,
    /// All stages done (quality gate passed or exhausted)
    Completed,
    /// A stage exhausted retries or the task timed out
    Failed,
}

impl TaskStatus {
    /// Whether this is a terminal state. Terminal tasks are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the transition to `next` is legal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
                | (TaskStatus::InProgress, TaskStatus::Failed)
                // Orphan recovery: a stale claim is released back to pending.
                | (TaskStatus::InProgress, TaskStatus::Pending)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Outcome of a single stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Failed,
}

/// Typed output of a stage, tagged by stage kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    /// Research findings
    Research {
        summary: String,
        sources: Vec<SourceRef>,
    },
    /// Drafted content
    Creative { content: String, word_count: usize },
    /// Quality evaluation of the current draft
    Qa { score: QualityScore },
    /// Supporting image assets
    Images { images: Vec<ImageAsset> },
    /// Final assembled deliverable
    Format { content: String, format: String },
    /// No output (failed attempts, side-effect-only stages)
    Empty,
}

impl StageOutput {
    /// The draft text carried by this output, if any.
    pub fn content(&self) -> Option<&str> {
        match self {
            StageOutput::Creative { content, .. } | StageOutput::Format { content, .. } => {
                Some(content)
            }
            _ => None,
        }
    }
}

/// A cited source found during research.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// An image asset looked up for the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAsset {
    pub url: String,
    pub alt_text: String,
}

/// One attempted execution of one stage, including failed attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Which stage was attempted
    pub stage: StageName,
    /// Whether the attempt completed or failed
    pub status: StageStatus,
    /// Typed output (Empty on failure)
    pub output: StageOutput,
    /// Wall-clock duration of the attempt
    pub duration_ms: u64,
    /// Tokens consumed by the underlying model call, if any
    #[serde(default)]
    pub tokens_used: Option<u64>,
    /// Model identifier used, if any
    #[serde(default)]
    pub model_used: Option<String>,
    /// Error message for failed attempts
    #[serde(default)]
    pub error: Option<String>,
    /// When the attempt finished
    pub finished_at: DateTime<Utc>,
}

impl StageResult {
    /// Record a completed attempt.
    pub fn completed(stage: StageName, output: StageOutput, duration_ms: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            output,
            duration_ms,
            tokens_used: None,
            model_used: None,
            error: None,
            finished_at: Utc::now(),
        }
    }

    /// Record a failed attempt.
    pub fn failed(stage: StageName, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            output: StageOutput::Empty,
            duration_ms,
            tokens_used: None,
            model_used: None,
            error: Some(error.into()),
            finished_at: Utc::now(),
        }
    }

    /// Attach model usage accounting.
    pub fn with_usage(mut self, tokens_used: Option<u64>, model_used: Option<String>) -> Self {
        self.tokens_used = tokens_used;
        self.model_used = model_used;
        self
    }
}

/// The central persisted entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,
    /// The intent that created this task (immutable)
    pub intent: Intent,
    /// The plan being executed (immutable, stored for audit)
    pub plan: ExecutionPlan,
    /// State machine position
    pub status: TaskStatus,
    /// Number of distinct plan stages completed so far; never decreases
    pub current_stage_index: usize,
    /// Append-only record of every stage attempt
    #[serde(default)]
    pub stage_results: Vec<StageResult>,
    /// Latest quality gate verdict, if evaluated
    #[serde(default)]
    pub quality: Option<QualityScore>,
    /// Task-global count of quality refinement iterations
    #[serde(default)]
    pub refinement_count: u32,
    /// Terminal error message for failed tasks
    #[serde(default)]
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last persisted update
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task from an intent and its plan.
    pub fn new(intent: Intent, plan: ExecutionPlan) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            intent,
            plan,
            status: TaskStatus::Pending,
            current_stage_index: 0,
            stage_results: Vec::new(),
            quality: None,
            refinement_count: 0,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a stage attempt and advance `current_stage_index` to the count
    /// of distinct completed stages. The index is monotonic: re-runs during
    /// refinement never move it backwards.
    pub fn record_stage_result(&mut self, result: StageResult) {
        self.stage_results.push(result);
        let completed: HashSet<StageName> = self
            .stage_results
            .iter()
            .filter(|r| r.status == StageStatus::Completed)
            .map(|r| r.stage)
            .collect();
        self.current_stage_index = self.current_stage_index.max(completed.len());
        self.touch();
    }

    /// All attempts for one stage, in order.
    pub fn attempts_for(&self, stage: StageName) -> Vec<&StageResult> {
        self.stage_results
            .iter()
            .filter(|r| r.stage == stage)
            .collect()
    }

    /// The latest completed output for a stage, if any.
    pub fn latest_output(&self, stage: StageName) -> Option<&StageOutput> {
        self.stage_results
            .iter()
            .rev()
            .find(|r| r.stage == stage && r.status == StageStatus::Completed)
            .map(|r| &r.output)
    }

    /// Bump the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
