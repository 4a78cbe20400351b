//! Intent resolver module
//!
//! The resolver turns raw user text into a structured Intent. It makes one
//! opaque classifier call; everything else is a pure function of the
//! classifier output plus regex/keyword heuristics over the raw text.
//!
//! Low classifier confidence (or a failed classifier call) does not bail:
//! the resolver degrades to a generic intent with a warning and leaves the
//! proceed-or-reprompt decision to the caller.

use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::stage::{Classification, IntentClassifier};
use crate::types::{ExecutionStrategy, Intent, IntentType, StageName, TaskType};

/// Resolver errors. Degradation paths return an Intent instead of erroring;
/// only structurally unusable input is rejected.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("input is empty")]
    EmptyInput,
}

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Classifier confidence below this floor falls back to a generic intent
    pub confidence_floor: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.5,
        }
    }
}

/// Intent resolver - one classifier call plus pure extraction.
pub struct IntentResolver {
    classifier: Arc<dyn IntentClassifier>,
    config: ResolverConfig,
    budget_re: Regex,
    word_count_re: Regex,
    topic_re: Regex,
}

impl IntentResolver {
    /// Create a resolver with default configuration.
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self::with_config(classifier, ResolverConfig::default())
    }

    /// Create a resolver with explicit configuration.
    pub fn with_config(classifier: Arc<dyn IntentClassifier>, config: ResolverConfig) -> Self {
        Self {
            classifier,
            config,
            // Trailing dollar amount, e.g. "... $50" or "... $12.50"
            budget_re: Regex::new(r"\$(\d+(?:\.\d+)?)\s*$").expect("budget regex"),
            word_count_re: Regex::new(r"(?i)\b(\d{2,5})\s*words?\b").expect("word count regex"),
            topic_re: Regex::new(r"(?i)\babout\s+(.+?)(?:\s*\+|\s*\$\d|$)").expect("topic regex"),
        }
    }

    /// Resolve raw user text into an Intent.
    pub async fn resolve(
        &self,
        raw_input: &str,
        context: &HashMap<String, Value>,
    ) -> Result<Intent, ResolveError> {
        let trimmed = raw_input.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::EmptyInput);
        }

        let classification = self.classifier.classify(trimmed).await;
        let parameters = self.extract_parameters(trimmed, context);

        let intent = match classification {
            Ok(c) if c.confidence >= self.config.confidence_floor => {
                self.build_intent(trimmed, &c, parameters)
            }
            Ok(c) => self.generic_fallback(
                trimmed,
                parameters,
                c.confidence,
                format!(
                    "classifier confidence {:.2} below floor {:.2}; using generic plan",
                    c.confidence, self.config.confidence_floor
                ),
            ),
            Err(err) => self.generic_fallback(
                trimmed,
                parameters,
                0.0,
                format!("classifier unavailable ({}); using generic plan", err),
            ),
        };

        Ok(intent)
    }

    fn build_intent(
        &self,
        raw_input: &str,
        classification: &Classification,
        parameters: HashMap<String, Value>,
    ) -> Intent {
        let intent_type = match classification.label.as_str() {
            "content_generation" => IntentType::ContentGeneration,
            "revision" => IntentType::Revision,
            "analysis" => IntentType::Analysis,
            _ => IntentType::Generic,
        };
        let task_type = detect_task_type(raw_input);
        let include_images = parameters
            .get("include_images")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let stages = suggested_stages(intent_type, include_images);
        let strategy = if independent_root_count(&stages) >= 2 {
            ExecutionStrategy::Parallel
        } else {
            ExecutionStrategy::Sequential
        };

        Intent::new(raw_input, intent_type, task_type, classification.confidence)
            .with_parameters(parameters)
            .with_stages(stages)
            .with_strategy(strategy)
    }

    fn generic_fallback(
        &self,
        raw_input: &str,
        parameters: HashMap<String, Value>,
        confidence: f64,
        warning: String,
    ) -> Intent {
        Intent::new(raw_input, IntentType::Generic, TaskType::Generic, confidence)
            .with_parameters(parameters)
            .with_stages(vec![StageName::Research, StageName::Format])
            .with_warning(warning)
    }

    /// Pure keyword/regex extraction over the raw text.
    fn extract_parameters(
        &self,
        raw_input: &str,
        context: &HashMap<String, Value>,
    ) -> HashMap<String, Value> {
        let mut params: HashMap<String, Value> = context.clone();
        let lower = raw_input.to_lowercase();

        if lower.contains("image") || lower.contains("photo") || lower.contains("picture") {
            params.insert("include_images".to_string(), json!(true));
        }

        if let Some(caps) = self.budget_re.captures(raw_input) {
            if let Ok(budget) = caps[1].parse::<f64>() {
                params.insert("budget".to_string(), json!(budget));
            }
        }

        if let Some(caps) = self.word_count_re.captures(raw_input) {
            if let Ok(words) = caps[1].parse::<u64>() {
                params.insert("word_count".to_string(), json!(words));
            }
        }

        if let Some(caps) = self.topic_re.captures(raw_input) {
            let topic = caps[1].trim().trim_end_matches(['.', '!', '?']).to_string();
            if !topic.is_empty() {
                params.insert("topic".to_string(), json!(topic));
            }
        }

        params
    }
}

fn detect_task_type(raw_input: &str) -> TaskType {
    let lower = raw_input.to_lowercase();
    if lower.contains("blog") || lower.contains("post about") || lower.contains("blog post") {
        TaskType::BlogPost
    } else if lower.contains("article") {
        TaskType::Article
    } else if lower.contains("tweet") || lower.contains("social") {
        TaskType::SocialPost
    } else if lower.contains("email") || lower.contains("newsletter") {
        TaskType::Email
    } else {
        TaskType::Generic
    }
}

/// Canonical stage list per intent type; images slot in before format.
fn suggested_stages(intent_type: IntentType, include_images: bool) -> Vec<StageName> {
    let mut stages = match intent_type {
        IntentType::ContentGeneration => vec![
            StageName::Research,
            StageName::Creative,
            StageName::Qa,
        ],
        IntentType::Revision => vec![StageName::Creative, StageName::Qa],
        IntentType::Analysis => vec![StageName::Research, StageName::Qa],
        IntentType::Generic => vec![StageName::Research],
    };
    if include_images {
        stages.push(StageName::Images);
    }
    stages.push(StageName::Format);
    stages
}

/// Stages with no upstream dependency in the canonical graph.
fn independent_root_count(stages: &[StageName]) -> usize {
    stages
        .iter()
        .filter(|s| matches!(s, StageName::Research | StageName::Images))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::stage::ProviderError;

    struct StaticClassifier {
        label: &'static str,
        confidence: f64,
        fail: bool,
    }

    #[async_trait]
    impl IntentClassifier for StaticClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification, ProviderError> {
            if self.fail {
                return Err(ProviderError::Network("connection refused".to_string()));
            }
            Ok(Classification {
                label: self.label.to_string(),
                confidence: self.confidence,
            })
        }
    }

    fn resolver(label: &'static str, confidence: f64) -> IntentResolver {
        IntentResolver::new(Arc::new(StaticClassifier {
            label,
            confidence,
            fail: false,
        }))
    }

    #[test]
    fn test_blog_post_with_images_resolves_full_pipeline() {
        tokio_test::block_on(async {
            let resolver = resolver("content_generation", 0.92);
            let intent = resolver
                .resolve("Generate blog post about AI trends + images", &HashMap::new())
                .await
                .unwrap();

            assert_eq!(intent.intent_type, IntentType::ContentGeneration);
            assert_eq!(intent.task_type, TaskType::BlogPost);
            assert_eq!(
                intent.suggested_stages,
                vec![
                    StageName::Research,
                    StageName::Creative,
                    StageName::Qa,
                    StageName::Images,
                    StageName::Format,
                ]
            );
            assert!(intent.param_bool("include_images"));
            assert_eq!(intent.param_str("topic"), Some("AI trends"));
            assert_eq!(intent.execution_strategy, ExecutionStrategy::Parallel);
            assert!(!intent.requires_confirmation);
        });
    }

    #[test]
    fn test_low_confidence_falls_back_to_generic_with_warning() {
        tokio_test::block_on(async {
            let resolver = resolver("content_generation", 0.3);
            let intent = resolver
                .resolve("do something, I guess", &HashMap::new())
                .await
                .unwrap();

            assert_eq!(intent.intent_type, IntentType::Generic);
            assert_eq!(
                intent.suggested_stages,
                vec![StageName::Research, StageName::Format]
            );
            assert!(intent.requires_confirmation);
            assert!(intent.warning.as_deref().unwrap().contains("below floor"));
        });
    }

    #[test]
    fn test_classifier_failure_still_returns_generic_intent() {
        tokio_test::block_on(async {
            let resolver = IntentResolver::new(Arc::new(StaticClassifier {
                label: "",
                confidence: 0.0,
                fail: true,
            }));
            let intent = resolver
                .resolve("write an article about rust", &HashMap::new())
                .await
                .unwrap();

            assert_eq!(intent.intent_type, IntentType::Generic);
            assert!(intent.warning.as_deref().unwrap().contains("unavailable"));
        });
    }

    #[test]
    fn test_budget_and_word_count_extraction() {
        tokio_test::block_on(async {
            let resolver = resolver("content_generation", 0.9);
            let intent = resolver
                .resolve("Write a 800 words article about databases $25", &HashMap::new())
                .await
                .unwrap();

            assert_eq!(intent.param_f64("budget"), Some(25.0));
            assert_eq!(intent.param_f64("word_count"), Some(800.0));
            assert_eq!(intent.param_str("topic"), Some("databases"));
        });
    }

    #[test]
    fn test_empty_input_is_rejected() {
        tokio_test::block_on(async {
            let resolver = resolver("content_generation", 0.9);
            assert!(matches!(
                resolver.resolve("   ", &HashMap::new()).await,
                Err(ResolveError::EmptyInput)
            ));
        });
    }
}
