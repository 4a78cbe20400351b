//! Execution planner module
//!
//! The planner turns an Intent plus business constraints into a costed
//! ExecutionPlan. It is responsible for:
//! - per-stage cost/duration estimates from a static cost table
//! - sequential vs parallel strategy selection
//! - aggregate quality / success-probability estimates
//! - proposing at least one alternative plan
//!
//! The planner never fails: an intent with no suggested stages degrades to
//! a generic research + format plan.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{
    ExecutionPlan, ExecutionStrategy, Intent, PlanConfidence, PlanStrategy, StageName, StagePlan,
};

/// Per-stage failure rate used for the success-probability estimate.
const STAGE_FAILURE_RATE: f64 = 0.02;

/// Baseline quality estimate on the 0-100 scale, before tier scaling.
const BASE_QUALITY_ESTIMATE: f64 = 78.0;

/// Requested quality tier; scales cost, duration and the quality estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreference {
    /// Fast and cheap, lower expected quality
    Draft,
    /// Balanced
    #[default]
    Standard,
    /// Slower and costlier, higher expected quality
    High,
}

impl QualityPreference {
    /// Cost/duration multiplier for this tier.
    pub fn cost_multiplier(&self) -> f64 {
        match self {
            QualityPreference::Draft => 0.7,
            QualityPreference::Standard => 1.0,
            QualityPreference::High => 1.3,
        }
    }

    /// Quality-estimate multiplier for this tier.
    pub fn quality_multiplier(&self) -> f64 {
        match self {
            QualityPreference::Draft => 0.85,
            QualityPreference::Standard => 1.0,
            QualityPreference::High => 1.1,
        }
    }
}

/// Business constraints handed to the planner alongside the intent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanConstraints {
    /// Budget ceiling in dollars
    #[serde(default)]
    pub budget: Option<f64>,
    /// Wall-clock deadline
    #[serde(default, with = "optional_duration_ms")]
    pub deadline: Option<Duration>,
    /// Requested quality tier
    #[serde(default)]
    pub quality_preference: QualityPreference,
}

/// Static per-stage base estimates: (duration, cost in dollars).
fn base_estimate(stage: StageName) -> (Duration, f64) {
    match stage {
        StageName::Research => (Duration::from_secs(15), 0.05),
        StageName::Creative => (Duration::from_secs(25), 0.15),
        StageName::Qa => (Duration::from_secs(12), 0.08),
        StageName::Images => (Duration::from_secs(8), 0.03),
        StageName::Format => (Duration::from_secs(3), 0.02),
    }
}

/// Input keys each stage expects from upstream stages.
fn required_inputs(stage: StageName) -> Vec<String> {
    match stage {
        StageName::Research | StageName::Images => Vec::new(),
        StageName::Creative => vec!["research.summary".to_string()],
        StageName::Qa => vec!["creative.content".to_string()],
        StageName::Format => vec!["creative.content".to_string()],
    }
}

/// Canonical dependency edges: creative follows research, qa follows
/// creative, format follows everything else. Research and images are roots.
fn dependencies(stage: StageName, stages: &[StageName]) -> Vec<StageName> {
    let present = |s: StageName| stages.contains(&s);
    match stage {
        StageName::Research | StageName::Images => Vec::new(),
        StageName::Creative => {
            if present(StageName::Research) {
                vec![StageName::Research]
            } else {
                Vec::new()
            }
        }
        StageName::Qa => {
            if present(StageName::Creative) {
                vec![StageName::Creative]
            } else if present(StageName::Research) {
                vec![StageName::Research]
            } else {
                Vec::new()
            }
        }
        StageName::Format => stages
            .iter()
            .copied()
            .filter(|s| *s != StageName::Format)
            .collect(),
    }
}

/// The execution planner. Pure: all estimates come from the static cost
/// table, so planning is deterministic for a given intent and constraints.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner;

impl ExecutionPlanner {
    /// Create a planner.
    pub fn new() -> Self {
        Self
    }

    /// Produce a plan for the intent under the given constraints.
    /// Infallible: degrades to a generic plan when the intent suggests no
    /// stages.
    pub fn plan(&self, intent: &Intent, constraints: &PlanConstraints) -> ExecutionPlan {
        let stages = if intent.suggested_stages.is_empty() {
            vec![StageName::Research, StageName::Format]
        } else {
            intent.suggested_stages.clone()
        };

        let tier = constraints.quality_preference;
        let strategy = self.choose_strategy(intent, constraints, &stages, tier);

        let mut primary = self.build_plan(&stages, strategy, tier);

        // Always offer at least one alternative differing in strategy or
        // tier; the caller/UI chooses.
        let mut alternatives = Vec::new();
        let other_strategy = match strategy {
            PlanStrategy::Sequential => PlanStrategy::Parallel,
            PlanStrategy::Parallel | PlanStrategy::Mixed => PlanStrategy::Sequential,
        };
        if parallelizable(&stages) || other_strategy == PlanStrategy::Sequential {
            alternatives.push(self.build_plan(&stages, other_strategy, tier));
        }
        let other_tier = match tier {
            QualityPreference::Draft => QualityPreference::Standard,
            QualityPreference::Standard => QualityPreference::High,
            QualityPreference::High => QualityPreference::Draft,
        };
        alternatives.push(self.build_plan(&stages, strategy, other_tier));

        primary.alternatives = alternatives;
        primary
    }

    fn choose_strategy(
        &self,
        intent: &Intent,
        constraints: &PlanConstraints,
        stages: &[StageName],
        tier: QualityPreference,
    ) -> PlanStrategy {
        if !parallelizable(stages) {
            return PlanStrategy::Sequential;
        }

        if intent.execution_strategy == ExecutionStrategy::Parallel {
            return PlanStrategy::Parallel;
        }

        // A deadline tighter than the sequential total forces parallelism.
        if let Some(deadline) = constraints.deadline {
            let sequential_total: u64 = stages
                .iter()
                .map(|s| scaled_duration_ms(*s, tier))
                .sum();
            if (deadline.as_millis() as u64) < sequential_total {
                return PlanStrategy::Parallel;
            }
        }

        PlanStrategy::Sequential
    }

    fn build_plan(
        &self,
        stages: &[StageName],
        strategy: PlanStrategy,
        tier: QualityPreference,
    ) -> ExecutionPlan {
        let stage_plans: Vec<StagePlan> = stages
            .iter()
            .map(|&stage| {
                let duration_ms = scaled_duration_ms(stage, tier);
                let cost = scaled_cost(stage, tier);
                let deps = match strategy {
                    PlanStrategy::Parallel | PlanStrategy::Mixed => dependencies(stage, stages),
                    PlanStrategy::Sequential => sequential_dependency(stage, stages),
                };
                let peers = match strategy {
                    PlanStrategy::Parallel | PlanStrategy::Mixed => {
                        parallel_peers(stage, stages)
                    }
                    PlanStrategy::Sequential => Vec::new(),
                };
                StagePlan::new(stage, duration_ms, cost)
                    .with_depends_on(deps)
                    .with_parallelizable_with(peers)
                    .with_required_inputs(required_inputs(stage))
            })
            .collect();

        let total_cost: f64 = stage_plans.iter().map(|s| s.cost_estimate).sum();
        let total_duration_ms = match strategy {
            PlanStrategy::Sequential => stage_plans.iter().map(|s| s.duration_estimate_ms).sum(),
            PlanStrategy::Parallel | PlanStrategy::Mixed => {
                critical_path_ms(&stage_plans)
            }
        };

        let success_probability =
            (1.0 - STAGE_FAILURE_RATE).powi(stage_plans.len() as i32);
        let quality_estimate =
            (BASE_QUALITY_ESTIMATE * tier.quality_multiplier()).min(95.0);
        let confidence = confidence_label(quality_estimate, success_probability);

        ExecutionPlan {
            stages: stage_plans,
            total_duration_estimate_ms: total_duration_ms,
            total_cost_estimate: total_cost,
            quality_score_estimate: quality_estimate,
            success_probability,
            strategy,
            confidence,
            alternatives: Vec::new(),
        }
    }
}

fn scaled_duration_ms(stage: StageName, tier: QualityPreference) -> u64 {
    let (duration, _) = base_estimate(stage);
    (duration.as_millis() as f64 * tier.cost_multiplier()).round() as u64
}

fn scaled_cost(stage: StageName, tier: QualityPreference) -> f64 {
    let (_, cost) = base_estimate(stage);
    cost * tier.cost_multiplier()
}

/// Whether the stage list has at least two independent roots worth running
/// concurrently.
fn parallelizable(stages: &[StageName]) -> bool {
    stages.contains(&StageName::Research) && stages.contains(&StageName::Images)
}

/// In a sequential plan each stage depends on its predecessor in list order.
fn sequential_dependency(stage: StageName, stages: &[StageName]) -> Vec<StageName> {
    stages
        .iter()
        .position(|s| *s == stage)
        .and_then(|idx| idx.checked_sub(1))
        .map(|prev| vec![stages[prev]])
        .unwrap_or_default()
}

fn parallel_peers(stage: StageName, stages: &[StageName]) -> Vec<StageName> {
    match stage {
        StageName::Research if stages.contains(&StageName::Images) => vec![StageName::Images],
        StageName::Images if stages.contains(&StageName::Research) => vec![StageName::Research],
        _ => Vec::new(),
    }
}

/// Longest dependency chain through the plan, by stage duration.
fn critical_path_ms(stages: &[StagePlan]) -> u64 {
    fn path_ms(stage: &StagePlan, all: &[StagePlan]) -> u64 {
        let longest_dep = stage
            .depends_on
            .iter()
            .filter_map(|dep| all.iter().find(|s| s.name == *dep))
            .map(|dep| path_ms(dep, all))
            .max()
            .unwrap_or(0);
        longest_dep + stage.duration_estimate_ms
    }

    stages.iter().map(|s| path_ms(s, stages)).max().unwrap_or(0)
}

fn confidence_label(quality_estimate: f64, success_probability: f64) -> PlanConfidence {
    if quality_estimate >= 80.0 && success_probability >= 0.88 {
        PlanConfidence::High
    } else if quality_estimate >= 65.0 {
        PlanConfidence::Medium
    } else {
        PlanConfidence::Low
    }
}

mod optional_duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}
