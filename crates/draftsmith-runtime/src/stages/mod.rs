//! Built-in stage runners.
//!
//! One runner per pipeline stage. The provider-backed runners (research,
//! creative, qa, images) hold their collaborators behind `Arc<dyn ...>`
//! traits; the format runner is pure assembly.

mod creative;
mod format;
mod images;
mod qa;
mod research;

pub use creative::CreativeRunner;
pub use format::FormatRunner;
pub use images::ImagesRunner;
pub use qa::QaRunner;
pub use research::ResearchRunner;

use std::sync::Arc;

use draftsmith_core::{ImageProvider, QualityEvaluator, SearchProvider, StageName, TextModel};

use crate::registry::StageRegistry;

/// Build a registry with all five built-in runners wired to the given
/// providers.
pub fn default_registry(
    model: Arc<dyn TextModel>,
    search: Arc<dyn SearchProvider>,
    images: Arc<dyn ImageProvider>,
    evaluator: Arc<dyn QualityEvaluator>,
) -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry
        .register(
            StageName::Research,
            Arc::new(ResearchRunner::new(search, model.clone())),
        )
        .register(StageName::Creative, Arc::new(CreativeRunner::new(model)))
        .register(StageName::Qa, Arc::new(QaRunner::new(evaluator)))
        .register(StageName::Images, Arc::new(ImagesRunner::new(images)))
        .register(StageName::Format, Arc::new(FormatRunner::new()));
    registry
}
