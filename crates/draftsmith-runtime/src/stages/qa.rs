//! QA stage: score the current draft with the quality evaluator.

use std::sync::Arc;

use async_trait::async_trait;
use draftsmith_core::{
    EvalContext, EvaluateError, QualityEvaluator, StageContext, StageInput, StageName,
    StageOutcome, StageOutput, StageRunner,
};

/// Wraps a [`QualityEvaluator`] as a pipeline stage. The verdict lands in
/// the stage output; the worker reads it there when applying the gate.
pub struct QaRunner {
    evaluator: Arc<dyn QualityEvaluator>,
}

impl QaRunner {
    pub fn new(evaluator: Arc<dyn QualityEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl StageRunner for QaRunner {
    fn name(&self) -> StageName {
        StageName::Qa
    }

    fn description(&self) -> &str {
        "scores the draft against the quality criteria"
    }

    async fn run(&self, input: StageInput, _ctx: StageContext) -> StageOutcome {
        // Pipeline runs score the latest creative draft. Research-only plans
        // have no draft, so fall back to the research summary, then to an
        // explicit content param for standalone invocations.
        let content = match input
            .draft_content()
            .or_else(|| input.research().map(|(summary, _)| summary))
            .or_else(|| input.param_str("content"))
        {
            Some(content) => content.to_string(),
            None => return StageOutcome::fatal("qa requires content to evaluate"),
        };

        let ctx = EvalContext {
            topic: input.param_str("topic").map(|s| s.to_string()),
            target_word_count: input.param_u64("word_count"),
        };

        match self.evaluator.evaluate(&content, &ctx).await {
            Ok(score) => StageOutcome::success(StageOutput::Qa { score }),
            Err(EvaluateError::EmptyContent) => {
                StageOutcome::fatal("qa received empty content")
            }
            Err(EvaluateError::Provider(e)) => StageOutcome::from_provider_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftsmith_core::PatternEvaluator;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_scores_the_prior_draft() {
        tokio_test::block_on(async {
            let runner = QaRunner::new(Arc::new(PatternEvaluator::new()));
            let mut prior = HashMap::new();
            prior.insert(
                StageName::Creative,
                StageOutput::Creative {
                    content: "A short draft about testing.".to_string(),
                    word_count: 5,
                },
            );
            let input = StageInput::new(json!({"topic": "testing"})).with_prior(prior);

            match runner.run(input, StageContext::new("t-1")).await {
                StageOutcome::Success {
                    output: StageOutput::Qa { score },
                    ..
                } => {
                    assert!(score.overall >= 0.0 && score.overall <= 10.0);
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }

    #[test]
    fn test_scores_the_research_summary_when_no_draft_exists() {
        tokio_test::block_on(async {
            let runner = QaRunner::new(Arc::new(PatternEvaluator::new()));
            let mut prior = HashMap::new();
            prior.insert(
                StageName::Research,
                StageOutput::Research {
                    summary: "Key findings on battery recycling yields.".to_string(),
                    sources: vec![],
                },
            );
            let input =
                StageInput::new(json!({"topic": "battery recycling"})).with_prior(prior);

            match runner.run(input, StageContext::new("t-1")).await {
                StageOutcome::Success {
                    output: StageOutput::Qa { score },
                    ..
                } => {
                    assert!(score.overall >= 0.0 && score.overall <= 10.0);
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }

    #[test]
    fn test_no_content_is_fatal() {
        tokio_test::block_on(async {
            let runner = QaRunner::new(Arc::new(PatternEvaluator::new()));
            let outcome = runner
                .run(StageInput::new(json!({})), StageContext::new("t-1"))
                .await;
            assert!(matches!(outcome, StageOutcome::Fatal { .. }));
        });
    }
}
