//! Intent type definitions
//!
//! Intent is the structured interpretation of a natural-language request.
//! It is created once by the resolver and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::StageName;

/// Broad classification of what the user is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    /// Produce new content end-to-end
    ContentGeneration,
    /// Revise existing content
    Revision,
    /// Analyze or summarize existing material
    Analysis,
    /// Could not be classified with confidence
    Generic,
}

/// The concrete deliverable the pipeline should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    BlogPost,
    Article,
    SocialPost,
    Email,
    Generic,
}

/// Preferred stage scheduling shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
}

/// Structured interpretation of a user request - the first-class input of
/// the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    /// Unique identifier for this intent
    pub id: String,
    /// The raw user text this intent was resolved from
    pub raw_input: String,
    /// Broad request classification
    pub intent_type: IntentType,
    /// Concrete deliverable type
    pub task_type: TaskType,
    /// Classifier confidence in [0, 1]
    pub confidence: f64,
    /// Extracted parameters (topic, budget, word_count, include_images, ...)
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
    /// Stages the resolver suggests, in pipeline order
    pub suggested_stages: Vec<StageName>,
    /// Whether the user should confirm before execution
    pub requires_confirmation: bool,
    /// Preferred scheduling shape
    pub execution_strategy: ExecutionStrategy,
    /// Warning attached when the resolver fell back to a generic intent
    #[serde(default)]
    pub warning: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Intent {
    /// Create a new intent with the given classification.
    pub fn new(
        raw_input: impl Into<String>,
        intent_type: IntentType,
        task_type: TaskType,
        confidence: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            raw_input: raw_input.into(),
            intent_type,
            task_type,
            confidence: confidence.clamp(0.0, 1.0),
            parameters: HashMap::new(),
            suggested_stages: Vec::new(),
            requires_confirmation: false,
            execution_strategy: ExecutionStrategy::Sequential,
            warning: None,
            created_at: Utc::now(),
        }
    }

    /// Set the suggested stage list.
    pub fn with_stages(mut self, stages: Vec<StageName>) -> Self {
        self.suggested_stages = stages;
        self
    }

    /// Set the extracted parameters.
    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.execution_strategy = strategy;
        self
    }

    /// Mark this intent as requiring user confirmation, with a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self.requires_confirmation = true;
        self
    }

    /// Get a string parameter by key.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(|v| v.as_str())
    }

    /// Get a boolean parameter by key (missing means false).
    pub fn param_bool(&self, key: &str) -> bool {
        self.parameters
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Get a numeric parameter by key.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.parameters.get(key).and_then(|v| v.as_f64())
    }
}
