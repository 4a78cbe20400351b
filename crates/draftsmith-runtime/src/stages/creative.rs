//! Creative stage: draft the content.

use std::sync::Arc;

use async_trait::async_trait;
use draftsmith_core::{
    StageContext, StageInput, StageName, StageOutcome, StageOutput, StageRunner, TextModel,
};

/// Drafts the deliverable from the topic, the research summary when present,
/// and any quality-gate feedback from a previous iteration.
pub struct CreativeRunner {
    model: Arc<dyn TextModel>,
}

impl CreativeRunner {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    fn build_prompt(&self, input: &StageInput) -> String {
        let topic = input.param_str("topic").unwrap_or("the requested subject");
        let mut prompt = format!("Write engaging content about {topic}.");

        if let Some(words) = input.param_u64("word_count") {
            prompt.push_str(&format!(" Target roughly {words} words."));
        }
        if let Some((summary, _)) = input.research() {
            prompt.push_str(&format!("\n\nGround the piece in this research:\n{summary}"));
        }
        if let Some(feedback) = &input.feedback {
            prompt.push_str(&format!(
                "\n\nThis is a revision. The previous draft was rejected: {}",
                feedback.feedback
            ));
            for suggestion in &feedback.suggestions {
                prompt.push_str(&format!("\n- {suggestion}"));
            }
        }
        prompt
    }
}

#[async_trait]
impl StageRunner for CreativeRunner {
    fn name(&self) -> StageName {
        StageName::Creative
    }

    fn description(&self) -> &str {
        "drafts the deliverable from topic, research and feedback"
    }

    async fn run(&self, input: StageInput, _ctx: StageContext) -> StageOutcome {
        let prompt = self.build_prompt(&input);
        match self.model.generate(&prompt).await {
            Ok(reply) => {
                let word_count = reply.text.split_whitespace().count();
                StageOutcome::success_with_usage(
                    StageOutput::Creative {
                        content: reply.text,
                        word_count,
                    },
                    reply.tokens_used,
                    reply.model,
                )
            }
            Err(e) => StageOutcome::from_provider_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftsmith_core::{ModelReply, ProviderError, RefinementFeedback};
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn new() -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextModel for RecordingModel {
        async fn generate(&self, prompt: &str) -> Result<ModelReply, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(ModelReply {
                text: "one two three four".to_string(),
                tokens_used: 10,
                model: "static-model".to_string(),
            })
        }
    }

    #[test]
    fn test_draft_carries_word_count() {
        tokio_test::block_on(async {
            let runner = CreativeRunner::new(Arc::new(RecordingModel::new()));
            let input = StageInput::new(json!({"topic": "remote work"}));

            match runner.run(input, StageContext::new("t-1")).await {
                StageOutcome::Success {
                    output: StageOutput::Creative { word_count, .. },
                    ..
                } => assert_eq!(word_count, 4),
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }

    #[test]
    fn test_feedback_reaches_the_prompt() {
        tokio_test::block_on(async {
            let model = Arc::new(RecordingModel::new());
            let runner = CreativeRunner::new(model.clone());
            let feedback = RefinementFeedback {
                feedback: "too vague".to_string(),
                suggestions: vec!["add concrete examples".to_string()],
            };
            let input = StageInput::new(json!({"topic": "remote work"})).with_feedback(feedback);

            runner.run(input, StageContext::new("t-1")).await;

            let prompts = model.prompts.lock().unwrap();
            assert!(prompts[0].contains("too vague"));
            assert!(prompts[0].contains("add concrete examples"));
        });
    }
}
