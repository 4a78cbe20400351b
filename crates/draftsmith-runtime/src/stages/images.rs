//! Images stage: look up supporting image assets.

use std::sync::Arc;

use async_trait::async_trait;
use draftsmith_core::{
    ImageProvider, StageContext, StageInput, StageName, StageOutcome, StageOutput, StageRunner,
};

const DEFAULT_IMAGE_COUNT: usize = 3;

/// Finds image assets matching the topic.
pub struct ImagesRunner {
    provider: Arc<dyn ImageProvider>,
}

impl ImagesRunner {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StageRunner for ImagesRunner {
    fn name(&self) -> StageName {
        StageName::Images
    }

    fn description(&self) -> &str {
        "finds supporting image assets for the topic"
    }

    async fn run(&self, input: StageInput, _ctx: StageContext) -> StageOutcome {
        let query = match input.param_str("topic").or_else(|| input.param_str("query")) {
            Some(q) => q.to_string(),
            None => return StageOutcome::fatal("images requires a topic or query parameter"),
        };
        let count = input
            .param_u64("image_count")
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_IMAGE_COUNT);

        match self.provider.find(&query, count).await {
            Ok(images) => StageOutcome::success(StageOutput::Images { images }),
            Err(e) => StageOutcome::from_provider_error(e),
        }
    }
}
