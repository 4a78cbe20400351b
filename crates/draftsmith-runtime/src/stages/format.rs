//! Format stage: assemble the final markdown deliverable.

use async_trait::async_trait;
use draftsmith_core::{
    StageContext, StageInput, StageName, StageOutcome, StageOutput, StageRunner,
};

/// Pure assembly of prior outputs into a markdown document. No providers,
/// no retries.
#[derive(Default)]
pub struct FormatRunner;

impl FormatRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageRunner for FormatRunner {
    fn name(&self) -> StageName {
        StageName::Format
    }

    fn description(&self) -> &str {
        "assembles prior outputs into a markdown document"
    }

    async fn run(&self, input: StageInput, _ctx: StageContext) -> StageOutcome {
        let body = input
            .draft_content()
            .map(|s| s.to_string())
            .or_else(|| input.research().map(|(summary, _)| summary.to_string()))
            .or_else(|| input.param_str("content").map(|s| s.to_string()));
        let body = match body {
            Some(body) => body,
            None => return StageOutcome::fatal("format has no content to assemble"),
        };

        let mut doc = String::new();
        if let Some(topic) = input.param_str("topic") {
            doc.push_str(&format!("# {topic}\n\n"));
        }
        doc.push_str(&body);

        for image in input.images() {
            doc.push_str(&format!("\n\n![{}]({})", image.alt_text, image.url));
        }

        if let Some((_, sources)) = input.research() {
            if !sources.is_empty() {
                doc.push_str("\n\n## Sources\n");
                for source in sources {
                    doc.push_str(&format!("- [{}]({})\n", source.title, source.url));
                }
            }
        }

        StageOutcome::success(StageOutput::Format {
            content: doc,
            format: "markdown".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftsmith_core::{ImageAsset, SourceRef};
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_assembles_all_sections() {
        tokio_test::block_on(async {
            let mut prior = HashMap::new();
            prior.insert(
                StageName::Creative,
                StageOutput::Creative {
                    content: "Body text.".to_string(),
                    word_count: 2,
                },
            );
            prior.insert(
                StageName::Research,
                StageOutput::Research {
                    summary: "Summary.".to_string(),
                    sources: vec![SourceRef {
                        title: "Ref".to_string(),
                        url: "https://example.com".to_string(),
                    }],
                },
            );
            prior.insert(
                StageName::Images,
                StageOutput::Images {
                    images: vec![ImageAsset {
                        url: "https://img.example.com/1".to_string(),
                        alt_text: "pic".to_string(),
                    }],
                },
            );
            let input = StageInput::new(json!({"topic": "Tea"})).with_prior(prior);

            match FormatRunner::new().run(input, StageContext::new("t-1")).await {
                StageOutcome::Success {
                    output: StageOutput::Format { content, format },
                    ..
                } => {
                    assert_eq!(format, "markdown");
                    assert!(content.starts_with("# Tea"));
                    assert!(content.contains("Body text."));
                    assert!(content.contains("![pic]"));
                    assert!(content.contains("## Sources"));
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        });
    }

    #[test]
    fn test_empty_input_is_fatal() {
        tokio_test::block_on(async {
            let outcome = FormatRunner::new()
                .run(StageInput::new(json!({})), StageContext::new("t-1"))
                .await;
            assert!(matches!(outcome, StageOutcome::Fatal { .. }));
        });
    }
}
