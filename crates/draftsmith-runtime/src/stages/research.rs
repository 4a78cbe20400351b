//! Research stage: gather sources and summarize them.

use std::sync::Arc;

use async_trait::async_trait;
use draftsmith_core::{
    SearchProvider, StageContext, StageInput, StageName, StageOutcome, StageOutput, StageRunner,
    TextModel,
};

const MAX_SOURCES: usize = 5;

/// Searches for sources on the topic, then asks the model for a summary of
/// the findings.
pub struct ResearchRunner {
    search: Arc<dyn SearchProvider>,
    model: Arc<dyn TextModel>,
}

impl ResearchRunner {
    pub fn new(search: Arc<dyn SearchProvider>, model: Arc<dyn TextModel>) -> Self {
        Self { search, model }
    }

    fn query(input: &StageInput) -> Option<String> {
        input
            .param_str("topic")
            .or_else(|| input.param_str("query"))
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl StageRunner for ResearchRunner {
    fn name(&self) -> StageName {
        StageName::Research
    }

    fn description(&self) -> &str {
        "gathers sources on the topic and summarizes them"
    }

    async fn run(&self, input: StageInput, _ctx: StageContext) -> StageOutcome {
        let query = match Self::query(&input) {
            Some(q) => q,
            None => return StageOutcome::fatal("research requires a topic or query parameter"),
        };

        let sources = match self.search.search(&query, MAX_SOURCES).await {
            Ok(sources) => sources,
            Err(e) => return StageOutcome::from_provider_error(e),
        };

        let mut prompt = format!(
            "Summarize the key facts about \"{query}\" in a short paragraph, \
             drawing on these sources:\n"
        );
        for source in &sources {
            prompt.push_str(&format!("- {} ({})\n", source.title, source.url));
        }

        match self.model.generate(&prompt).await {
            Ok(reply) => StageOutcome::success_with_usage(
                StageOutput::Research {
                    summary: reply.text,
                    sources,
                },
                reply.tokens_used,
                reply.model,
            ),
            Err(e) => StageOutcome::from_provider_error(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftsmith_core::{ModelReply, ProviderError, SourceRef};
    use serde_json::json;

    struct StaticSearch;

    #[async_trait]
    impl SearchProvider for StaticSearch {
        async fn search(
            &self,
            query: &str,
            limit: usize,
        ) -> Result<Vec<SourceRef>, ProviderError> {
            assert!(limit >= 1);
            Ok(vec![SourceRef {
                title: format!("About {query}"),
                url: "https://example.com/1".to_string(),
            }])
        }
    }

    struct StaticModel;

    #[async_trait]
    impl TextModel for StaticModel {
        async fn generate(&self, _prompt: &str) -> Result<ModelReply, ProviderError> {
            Ok(ModelReply {
                text: "Summary of findings.".to_string(),
                tokens_used: 42,
                model: "static-model".to_string(),
            })
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl SearchProvider for FailingSearch {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<SourceRef>, ProviderError> {
            Err(ProviderError::Timeout)
        }
    }

    #[test]
    fn test_research_produces_summary_and_sources() {
        tokio_test::block_on(async {
            let runner = ResearchRunner::new(Arc::new(StaticSearch), Arc::new(StaticModel));
            let input = StageInput::new(json!({"topic": "rust async"}));

            match runner.run(input, StageContext::new("t-1")).await {
                StageOutcome::Success {
                    output: StageOutput::Research { summary, sources },
                    tokens_used,
                    ..
                } => {
                    assert_eq!(summary, "Summary of findings.");
                    assert_eq!(sources.len(), 1);
                    assert_eq!(tokens_used, Some(42));
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }

    #[test]
    fn test_missing_topic_is_fatal() {
        tokio_test::block_on(async {
            let runner = ResearchRunner::new(Arc::new(StaticSearch), Arc::new(StaticModel));
            let outcome = runner
                .run(StageInput::new(json!({})), StageContext::new("t-1"))
                .await;
            assert!(matches!(outcome, StageOutcome::Fatal { .. }));
        });
    }

    #[test]
    fn test_search_timeout_is_retryable() {
        tokio_test::block_on(async {
            let runner = ResearchRunner::new(Arc::new(FailingSearch), Arc::new(StaticModel));
            let input = StageInput::new(json!({"topic": "rust async"}));
            let outcome = runner.run(input, StageContext::new("t-1")).await;
            assert!(matches!(outcome, StageOutcome::Retryable { .. }));
        });
    }
}
