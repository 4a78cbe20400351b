//! External provider traits
//!
//! The LLM, search, image-lookup and intent-classification collaborators are
//! out of scope for this system: each is a single opaque async call behind a
//! trait. Implementations live at the edges (and as fakes in tests).

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ImageAsset, SourceRef};

/// Provider call failures, split along the retry taxonomy.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("provider call timed out")]
    Timeout,

    #[error("provider rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transient network failure: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the caller should retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::RateLimited { .. } | ProviderError::Network(_)
        )
    }

    /// Provider-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// A completed text-model call.
#[derive(Debug, Clone)]
pub struct ModelReply {
    /// Generated text
    pub text: String,
    /// Tokens consumed by the call
    pub tokens_used: u64,
    /// Model identifier
    pub model: String,
}

/// Opaque text-generation call.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Generate text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<ModelReply, ProviderError>;
}

/// Opaque web/search lookup used by the research stage.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for sources on a query.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceRef>, ProviderError>;
}

/// Opaque image-asset lookup used by the images stage.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Find image assets matching a query.
    async fn find(&self, query: &str, count: usize) -> Result<Vec<ImageAsset>, ProviderError>;
}

/// Result of the external NLP intent classifier.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Classifier label, e.g. "content_generation"
    pub label: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Opaque NLP classification call consumed by the intent resolver.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Classify raw user text.
    async fn classify(&self, text: &str) -> Result<Classification, ProviderError>;
}
