//! draftsmith-config - configuration types and loading.
//!
//! One YAML file configures the whole process: app identity, worker policy
//! knobs, resolver and evaluator settings. Loading validates eagerly so a
//! bad file fails at startup, not mid-task.

mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{load_config, ConfigError};

/// Full process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftsmithConfig {
    /// Config schema version; must be > 0
    pub version: u32,
    /// Application identity
    #[serde(default)]
    pub app: AppConfig,
    /// Worker policy knobs
    #[serde(default)]
    pub worker: WorkerSettings,
    /// Intent resolver settings
    #[serde(default)]
    pub resolver: ResolverSettings,
    /// Quality evaluator settings
    #[serde(default)]
    pub evaluator: EvaluatorSettings,
}

/// Application identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Process name used in logs
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "draftsmith".to_string(),
        }
    }
}

/// Worker policy knobs. Defaults match the runtime's built-in policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Retries after the first failed attempt of a stage
    #[serde(default = "default_max_stage_retries")]
    pub max_stage_retries: u32,
    /// Quality refinement iterations per task
    #[serde(default = "default_max_refinements")]
    pub max_refinements: u32,
    /// Per-stage timeout in seconds
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,
    /// Whole-task wall-clock ceiling in seconds
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    /// Catch-up scan interval in seconds
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// in_progress tasks untouched for this long are reclaimed
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Concurrent stage executions per task
    #[serde(default = "default_max_parallel_stages")]
    pub max_parallel_stages: usize,
}

fn default_max_stage_retries() -> u32 {
    2
}
fn default_max_refinements() -> u32 {
    2
}
fn default_stage_timeout_secs() -> u64 {
    60
}
fn default_task_timeout_secs() -> u64 {
    600
}
fn default_scan_interval_secs() -> u64 {
    60
}
fn default_stale_after_secs() -> u64 {
    300
}
fn default_max_parallel_stages() -> usize {
    4
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_stage_retries: default_max_stage_retries(),
            max_refinements: default_max_refinements(),
            stage_timeout_secs: default_stage_timeout_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            scan_interval_secs: default_scan_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            max_parallel_stages: default_max_parallel_stages(),
        }
    }
}

/// Intent resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Classifier confidence below this floor degrades to a generic intent
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
}

fn default_confidence_floor() -> f64 {
    0.5
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            confidence_floor: default_confidence_floor(),
        }
    }
}

/// Quality evaluator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluatorSettings {
    /// Delegate scoring to the LLM evaluator instead of the pattern one
    #[serde(default)]
    pub use_llm: bool,
}
