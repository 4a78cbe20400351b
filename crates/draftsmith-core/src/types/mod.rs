//! Domain type definitions
//!
//! The persisted shapes of the system: Intent (what the user wants),
//! ExecutionPlan (how to do it), Task (the stateful record of doing it),
//! StageResult (one attempt of one stage) and QualityScore (the gate verdict).

mod intent;
mod plan;
mod quality;
mod task;

pub use intent::{ExecutionStrategy, Intent, IntentType, TaskType};
pub use plan::{ExecutionPlan, PlanConfidence, PlanStrategy, PlanValidationError, StagePlan};
pub use quality::{
    Criterion, EvaluationMethod, QualityScore, PASSING_THRESHOLD, SUGGESTION_THRESHOLD,
};
pub use task::{
    ImageAsset, SourceRef, StageOutput, StageResult, StageStatus, Task, TaskId, TaskStatus,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stage identifier.
///
/// The five content-producing stages are a closed set; plans and stage
/// runners are both keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Gather source material for the topic
    Research,
    /// Draft the content itself
    Creative,
    /// Score the draft against the quality criteria
    Qa,
    /// Look up supporting image assets
    Images,
    /// Assemble the final deliverable
    Format,
}

impl StageName {
    /// All stages in canonical pipeline order.
    pub const ALL: [StageName; 5] = [
        StageName::Research,
        StageName::Creative,
        StageName::Qa,
        StageName::Images,
        StageName::Format,
    ];

    /// Stable snake_case name used in plans, routes and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Research => "research",
            StageName::Creative => "creative",
            StageName::Qa => "qa",
            StageName::Images => "images",
            StageName::Format => "format",
        }
    }

    /// Whether this stage produces the content the quality gate scores.
    pub fn is_content_stage(&self) -> bool {
        matches!(self, StageName::Creative | StageName::Qa)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(StageName::Research),
            "creative" => Ok(StageName::Creative),
            "qa" => Ok(StageName::Qa),
            "images" => Ok(StageName::Images),
            "format" => Ok(StageName::Format),
            other => Err(UnknownStage(other.to_string())),
        }
    }
}

/// Error for parsing an unknown stage name.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown stage: {0}")]
pub struct UnknownStage(pub String);
