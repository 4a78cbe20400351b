//! Execution plan type definitions
//!
//! An ExecutionPlan is the costed, ordered/parallel breakdown of stages
//! produced by the planner. Plans are immutable once created and are stored
//! verbatim inside the Task record for auditability.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::StageName;

/// Scheduling shape of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStrategy {
    Sequential,
    Parallel,
    Mixed,
}

/// Coarse confidence label attached to a plan, derived from its quality and
/// success estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanConfidence {
    Low,
    Medium,
    High,
}

/// One stage of an execution plan with its estimates and dependencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagePlan {
    /// Which stage this is
    pub name: StageName,
    /// Stages that must complete before this one starts
    #[serde(default)]
    pub depends_on: Vec<StageName>,
    /// Stages this one may run concurrently with
    #[serde(default)]
    pub parallelizable_with: Vec<StageName>,
    /// Estimated wall-clock duration in milliseconds
    pub duration_estimate_ms: u64,
    /// Estimated provider cost in dollars
    pub cost_estimate: f64,
    /// Input keys this stage expects to find in prior outputs
    #[serde(default)]
    pub required_inputs: Vec<String>,
}

impl StagePlan {
    /// Create a stage plan with no dependencies.
    pub fn new(name: StageName, duration_estimate_ms: u64, cost_estimate: f64) -> Self {
        Self {
            name,
            depends_on: Vec::new(),
            parallelizable_with: Vec::new(),
            duration_estimate_ms,
            cost_estimate,
            required_inputs: Vec::new(),
        }
    }

    /// Add dependencies.
    pub fn with_depends_on(mut self, deps: Vec<StageName>) -> Self {
        self.depends_on = deps;
        self
    }

    /// Declare stages this one can run alongside.
    pub fn with_parallelizable_with(mut self, peers: Vec<StageName>) -> Self {
        self.parallelizable_with = peers;
        self
    }

    /// Declare required input keys.
    pub fn with_required_inputs(mut self, inputs: Vec<String>) -> Self {
        self.required_inputs = inputs;
        self
    }
}

/// Plan validation errors.
#[derive(Debug, Error)]
pub enum PlanValidationError {
    #[error("plan has no stages")]
    Empty,

    #[error("duplicate stage in plan: {0}")]
    DuplicateStage(StageName),

    #[error("stage '{0}' depends on '{1}' which is not in the plan")]
    MissingDependency(StageName, StageName),

    #[error("dependency cycle involving stage: {0}")]
    CycleDetected(StageName),
}

/// The full costed execution plan for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Stages in pipeline order
    pub stages: Vec<StagePlan>,
    /// Estimated total duration; critical-path length for parallel plans
    pub total_duration_estimate_ms: u64,
    /// Estimated total provider cost in dollars
    pub total_cost_estimate: f64,
    /// Expected quality score on the 0-100 scale
    pub quality_score_estimate: f64,
    /// Probability that every stage succeeds
    pub success_probability: f64,
    /// Scheduling shape
    pub strategy: PlanStrategy,
    /// Coarse confidence label
    pub confidence: PlanConfidence,
    /// Alternative plans differing in strategy or quality tier
    #[serde(default)]
    pub alternatives: Vec<ExecutionPlan>,
}

impl ExecutionPlan {
    /// Look up a stage plan by name.
    pub fn stage(&self, name: StageName) -> Option<&StagePlan> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Whether the plan contains the given stage.
    pub fn has_stage(&self, name: StageName) -> bool {
        self.stage(name).is_some()
    }

    /// The stage whose output the quality gate scores: qa when planned,
    /// otherwise creative.
    pub fn terminal_content_stage(&self) -> Option<StageName> {
        if self.has_stage(StageName::Qa) {
            Some(StageName::Qa)
        } else if self.has_stage(StageName::Creative) {
            Some(StageName::Creative)
        } else {
            None
        }
    }

    /// Validate plan invariants: non-empty, unique stage names, dependencies
    /// resolve within the plan, and the dependency graph is acyclic.
    pub fn validate(&self) -> Result<(), PlanValidationError> {
        if self.stages.is_empty() {
            return Err(PlanValidationError::Empty);
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name) {
                return Err(PlanValidationError::DuplicateStage(stage.name));
            }
        }

        for stage in &self.stages {
            for dep in &stage.depends_on {
                if !seen.contains(dep) {
                    return Err(PlanValidationError::MissingDependency(stage.name, *dep));
                }
            }
        }

        self.detect_cycles()
    }

    /// DFS cycle detection over the depends_on graph.
    fn detect_cycles(&self) -> Result<(), PlanValidationError> {
        let mut adj: HashMap<StageName, Vec<StageName>> = HashMap::new();
        for stage in &self.stages {
            adj.entry(stage.name).or_default();
            for dep in &stage.depends_on {
                adj.entry(*dep).or_default().push(stage.name);
            }
        }

        fn dfs(
            node: StageName,
            adj: &HashMap<StageName, Vec<StageName>>,
            visited: &mut HashSet<StageName>,
            rec_stack: &mut HashSet<StageName>,
        ) -> Option<StageName> {
            visited.insert(node);
            rec_stack.insert(node);

            if let Some(neighbors) = adj.get(&node) {
                for &neighbor in neighbors {
                    if !visited.contains(&neighbor) {
                        if let Some(hit) = dfs(neighbor, adj, visited, rec_stack) {
                            return Some(hit);
                        }
                    } else if rec_stack.contains(&neighbor) {
                        return Some(neighbor);
                    }
                }
            }

            rec_stack.remove(&node);
            None
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        for stage in &self.stages {
            if !visited.contains(&stage.name) {
                if let Some(hit) = dfs(stage.name, &adj, &mut visited, &mut rec_stack) {
                    return Err(PlanValidationError::CycleDetected(hit));
                }
            }
        }

        Ok(())
    }
}
