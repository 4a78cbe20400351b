//! Stage runner abstraction
//!
//! A StageRunner is the atomic unit of pipeline work. Runners are black
//! boxes to the executor: they take typed prior outputs plus loose JSON
//! params, do their (usually provider-backed) work, and report an outcome
//! with retry semantics.

mod provider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

pub use provider::{
    Classification, ImageProvider, IntentClassifier, ModelReply, ProviderError, SearchProvider,
    TextModel,
};

use crate::types::{ImageAsset, QualityScore, SourceRef, StageName, StageOutput, TaskId};

/// Quality-gate feedback threaded into a refinement re-run.
///
/// Refinement is not a separate code path: the same runner receives the
/// evaluator's feedback as an additional input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementFeedback {
    /// Summary of why the previous draft failed the gate
    pub feedback: String,
    /// Deterministic per-criterion suggestions
    pub suggestions: Vec<String>,
}

impl RefinementFeedback {
    /// Build feedback from a failing quality score.
    pub fn from_score(score: &QualityScore) -> Self {
        Self {
            feedback: score.feedback.clone(),
            suggestions: score.suggestions.clone(),
        }
    }
}

/// Input to a stage invocation.
#[derive(Debug, Clone, Default)]
pub struct StageInput {
    /// Loose parameters (topic, word_count, ...) from the intent or caller
    pub params: Value,
    /// Typed outputs of previously completed stages
    pub prior: HashMap<StageName, StageOutput>,
    /// Quality-gate feedback, present only on refinement re-runs
    pub feedback: Option<RefinementFeedback>,
}

impl StageInput {
    /// Create an input with just params.
    pub fn new(params: Value) -> Self {
        Self {
            params,
            prior: HashMap::new(),
            feedback: None,
        }
    }

    /// Attach prior stage outputs.
    pub fn with_prior(mut self, prior: HashMap<StageName, StageOutput>) -> Self {
        self.prior = prior;
        self
    }

    /// Attach refinement feedback.
    pub fn with_feedback(mut self, feedback: RefinementFeedback) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Get a string param by key.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Get a numeric param by key.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(|v| v.as_u64())
    }

    /// The most recent draft content available to this stage.
    pub fn draft_content(&self) -> Option<&str> {
        self.prior
            .get(&StageName::Creative)
            .and_then(|output| output.content())
    }

    /// Research output available to this stage, if any.
    pub fn research(&self) -> Option<(&str, &[SourceRef])> {
        match self.prior.get(&StageName::Research) {
            Some(StageOutput::Research { summary, sources }) => {
                Some((summary.as_str(), sources.as_slice()))
            }
            _ => None,
        }
    }

    /// Image assets available to this stage, if any.
    pub fn images(&self) -> &[ImageAsset] {
        match self.prior.get(&StageName::Images) {
            Some(StageOutput::Images { images }) => images.as_slice(),
            _ => &[],
        }
    }
}

/// Execution context passed to a runner.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Task this invocation belongs to ("subtask" ids for standalone runs)
    pub task_id: TaskId,
    /// 1-based attempt number, counting retries
    pub attempt: u32,
}

impl StageContext {
    /// Create a context for the first attempt.
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            attempt: 1,
        }
    }

    /// Create a context for a specific attempt number.
    pub fn attempt(task_id: impl Into<TaskId>, attempt: u32) -> Self {
        Self {
            task_id: task_id.into(),
            attempt,
        }
    }
}

/// Outcome of a stage invocation, with retry semantics.
///
/// Timeouts and rate limits are `Retryable`; validation failures and
/// malformed provider responses are `Fatal` and fail the task without retry.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// The stage produced its output
    Success {
        output: StageOutput,
        tokens_used: Option<u64>,
        model_used: Option<String>,
    },
    /// Transient failure; the executor retries with backoff
    Retryable {
        message: String,
        retry_after: Option<Duration>,
    },
    /// Non-recoverable failure; fail fast
    Fatal { message: String },
}

impl StageOutcome {
    /// Convenience: a success with no usage accounting.
    pub fn success(output: StageOutput) -> Self {
        Self::Success {
            output,
            tokens_used: None,
            model_used: None,
        }
    }

    /// Convenience: a success with model usage.
    pub fn success_with_usage(output: StageOutput, tokens_used: u64, model_used: String) -> Self {
        Self::Success {
            output,
            tokens_used: Some(tokens_used),
            model_used: Some(model_used),
        }
    }

    /// Convenience: a retryable failure.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Convenience: a fatal failure.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Map a provider error onto the retry taxonomy.
    pub fn from_provider_error(error: ProviderError) -> Self {
        if error.is_retryable() {
            Self::Retryable {
                retry_after: error.retry_after(),
                message: error.to_string(),
            }
        } else {
            Self::Fatal {
                message: error.to_string(),
            }
        }
    }

    /// Whether this outcome is a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// StageRunner trait - one unit of pipeline work.
///
/// Runners must be idempotent: the executor guarantees at-least-once
/// invocation, not exactly-once.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Which stage this runner implements
    fn name(&self) -> StageName;

    /// Short description (for logs and the subtask API)
    fn description(&self) -> &str;

    /// Execute the stage
    async fn run(&self, input: StageInput, ctx: StageContext) -> StageOutcome;
}
