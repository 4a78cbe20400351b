//! draftsmith-core - domain types and planning/evaluation logic
//!
//! This crate contains everything the rest of the workspace builds on:
//! - `types`: Intent, ExecutionPlan, Task, StageResult, QualityScore
//! - `stage`: the StageRunner trait and external provider traits
//! - `resolver`: raw text -> Intent
//! - `planner`: Intent -> ExecutionPlan
//! - `evaluator`: content -> QualityScore (pattern and LLM strategies)
//! - `store`: the TaskStore contract consumed by the runtime

pub mod evaluator;
pub mod planner;
pub mod resolver;
pub mod stage;
pub mod store;
pub mod types;

pub use evaluator::{EvalContext, EvaluateError, LlmEvaluator, PatternEvaluator, QualityEvaluator};
pub use planner::{ExecutionPlanner, PlanConstraints, QualityPreference};
pub use resolver::{IntentResolver, ResolveError, ResolverConfig};
pub use stage::{
    Classification, ImageProvider, IntentClassifier, ModelReply, ProviderError,
    RefinementFeedback, SearchProvider, StageContext, StageInput, StageOutcome, StageRunner,
    TextModel,
};
pub use store::{StoreError, TaskStore};
pub use types::{
    Criterion, EvaluationMethod, ExecutionPlan, ExecutionStrategy, ImageAsset, Intent, IntentType,
    PlanConfidence, PlanStrategy, QualityScore, SourceRef, StageName, StageOutput, StagePlan,
    StageResult, StageStatus, Task, TaskId, TaskStatus, TaskType,
};
