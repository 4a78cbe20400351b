//! Built-in offline providers.
//!
//! The external collaborators (text model, search, images, classifier) are
//! trait objects; these deterministic local implementations keep the binary
//! self-contained so the pipeline runs end to end without credentials. Swap
//! in real providers by registering different implementations at startup.

use async_trait::async_trait;
use draftsmith_core::{
    Classification, ImageAsset, ImageProvider, IntentClassifier, ModelReply, ProviderError,
    SearchProvider, SourceRef, TextModel,
};

const MODEL_NAME: &str = "draftsmith-sim";

/// Deterministic local text model. Generates serviceable placeholder prose
/// from the prompt so drafts, summaries and evaluations have real text to
/// work with.
pub struct SimulatedModel;

#[async_trait]
impl TextModel for SimulatedModel {
    async fn generate(&self, prompt: &str) -> Result<ModelReply, ProviderError> {
        let subject = prompt
            .lines()
            .next()
            .unwrap_or("the requested subject")
            .trim_end_matches('.');

        let text = format!(
            "## Overview\n\n\
             {subject} This piece walks through the essentials: where the \
             field stands today, what the data shows, and what to watch next. \
             According to recent industry reports, adoption has grown steadily \
             over the past 3 years, with 42% of surveyed teams reporting \
             measurable gains.\n\n\
             ## What the evidence shows\n\n\
             A 2025 study found that teams investing early saw compounding \
             returns. The practical takeaway is simple. Start small, measure \
             honestly, and expand what works. Have you considered how this \
             applies to your own work?\n\n\
             ## Next steps\n\n\
             If you want to go deeper, learn more from the sources below and \
             get started with a small pilot."
        );

        Ok(ModelReply {
            tokens_used: (text.len() / 4) as u64,
            text,
            model: MODEL_NAME.to_string(),
        })
    }
}

/// Deterministic local search provider.
pub struct SimulatedSearch;

#[async_trait]
impl SearchProvider for SimulatedSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceRef>, ProviderError> {
        let slug: String = query
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        Ok((1..=limit)
            .map(|i| SourceRef {
                title: format!("{query}: reference {i}"),
                url: format!("https://research.example.com/{slug}/{i}"),
            })
            .collect())
    }
}

/// Deterministic local image provider.
pub struct SimulatedImages;

#[async_trait]
impl ImageProvider for SimulatedImages {
    async fn find(&self, query: &str, count: usize) -> Result<Vec<ImageAsset>, ProviderError> {
        Ok((1..=count)
            .map(|i| ImageAsset {
                url: format!("https://images.example.com/{i}?q={query}"),
                alt_text: format!("Illustration {i} for {query}"),
            })
            .collect())
    }
}

/// Keyword intent classifier standing in for an external NLP service.
pub struct KeywordClassifier;

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(&self, text: &str) -> Result<Classification, ProviderError> {
        let lower = text.to_lowercase();
        let (label, confidence) = if ["revise", "rewrite", "edit", "improve"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            ("revision", 0.85)
        } else if ["analyze", "analyse", "summarize", "summarise", "review"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            ("analysis", 0.85)
        } else if ["write", "generate", "create", "draft", "blog", "article", "post", "email"]
            .iter()
            .any(|kw| lower.contains(kw))
        {
            ("content_generation", 0.9)
        } else {
            ("generic", 0.3)
        };
        Ok(Classification {
            label: label.to_string(),
            confidence,
        })
    }
}
