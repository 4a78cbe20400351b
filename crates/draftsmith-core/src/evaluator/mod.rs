//! Quality evaluator module
//!
//! Two interchangeable scoring strategies behind one trait:
//! - PatternEvaluator: deterministic text heuristics, pure in content+context
//! - LlmEvaluator: delegates scoring to an external model, falling back to
//!   the pattern evaluator on malformed output
//!
//! Both produce the same QualityScore shape so the executor is agnostic to
//! which one gates a task.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::stage::{ProviderError, TextModel};
use crate::types::{Criterion, EvaluationMethod, QualityScore};

/// Evaluation errors.
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("content is empty")]
    EmptyContent,

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Context handed to an evaluation: what the content was supposed to be.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// Topic the content should cover
    pub topic: Option<String>,
    /// Requested word count, if the user asked for one
    pub target_word_count: Option<u64>,
}

impl EvalContext {
    /// Context with just a topic.
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            target_word_count: None,
        }
    }
}

/// QualityEvaluator trait - scores content against the seven criteria.
#[async_trait]
pub trait QualityEvaluator: Send + Sync {
    /// Evaluate content, returning the gate verdict.
    async fn evaluate(&self, content: &str, ctx: &EvalContext)
        -> Result<QualityScore, EvaluateError>;
}

/// Default word-count target when the context does not carry one.
const DEFAULT_TARGET_WORDS: u64 = 600;

/// Deterministic pattern-based evaluator. Scoring is purely a function of
/// the content and context: identical input yields an identical score.
pub struct PatternEvaluator {
    heading_re: Regex,
    citation_re: Regex,
    cta_re: Regex,
}

impl PatternEvaluator {
    /// Create a pattern evaluator.
    pub fn new() -> Self {
        Self {
            heading_re: Regex::new(r"(?m)^#{1,6}\s+\S").expect("heading regex"),
            citation_re: Regex::new(r"(?i)(according to|\[\d+\]|source:|study|report)")
                .expect("citation regex"),
            cta_re: Regex::new(r"(?i)(subscribe|sign up|learn more|get started|try it|contact us)")
                .expect("cta regex"),
        }
    }

    fn score(&self, content: &str, ctx: &EvalContext) -> BTreeMap<Criterion, f64> {
        let words: Vec<&str> = content.split_whitespace().collect();
        let word_count = words.len();
        let sentences = split_sentences(content);
        let paragraphs: Vec<&str> = content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let mut criteria = BTreeMap::new();
        criteria.insert(Criterion::Clarity, self.clarity(&sentences));
        criteria.insert(Criterion::Accuracy, self.accuracy(content));
        criteria.insert(
            Criterion::Completeness,
            self.completeness(word_count, paragraphs.len(), ctx),
        );
        criteria.insert(Criterion::Relevance, self.relevance(content, ctx));
        criteria.insert(Criterion::SeoQuality, self.seo_quality(content, ctx));
        criteria.insert(Criterion::Readability, self.readability(&words, &sentences));
        criteria.insert(Criterion::Engagement, self.engagement(content, &sentences));
        criteria
    }

    /// Average sentence length: the 12-20 word band scores best.
    fn clarity(&self, sentences: &[&str]) -> f64 {
        if sentences.is_empty() {
            return 0.0;
        }
        let total_words: usize = sentences
            .iter()
            .map(|s| s.split_whitespace().count())
            .sum();
        let avg = total_words as f64 / sentences.len() as f64;
        if (12.0..=20.0).contains(&avg) {
            9.0
        } else if (8.0..=26.0).contains(&avg) {
            7.0
        } else if (5.0..=32.0).contains(&avg) {
            5.0
        } else {
            3.0
        }
    }

    /// Concrete figures and citation markers.
    fn accuracy(&self, content: &str) -> f64 {
        let digit_hits = content.chars().filter(|c| c.is_ascii_digit()).count().min(30);
        let citation_hits = self.citation_re.find_iter(content).count().min(5);
        let percent_hits = content.matches('%').count().min(3);
        3.0 + (digit_hits as f64 * 0.1)
            + (citation_hits as f64 * 0.8)
            + (percent_hits as f64 * 0.5)
    }

    /// Word and paragraph counts against the target length.
    fn completeness(&self, word_count: usize, paragraph_count: usize, ctx: &EvalContext) -> f64 {
        let target = ctx.target_word_count.unwrap_or(DEFAULT_TARGET_WORDS) as f64;
        let length_ratio = (word_count as f64 / target).min(1.0);
        let structure = (paragraph_count as f64 / 4.0).min(1.0);
        length_ratio * 7.0 + structure * 3.0
    }

    /// Topic keyword density. Without a topic the criterion is neutral.
    fn relevance(&self, content: &str, ctx: &EvalContext) -> f64 {
        let Some(topic) = &ctx.topic else {
            return 6.0;
        };
        let lower = content.to_lowercase();
        let keywords: Vec<String> = topic
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .filter(|w| w.len() > 2)
            .collect();
        if keywords.is_empty() {
            return 6.0;
        }
        let mentioned = keywords.iter().filter(|k| lower.contains(k.as_str())).count();
        let coverage = mentioned as f64 / keywords.len() as f64;
        2.0 + coverage * 8.0
    }

    /// Headings plus topic-in-lead.
    fn seo_quality(&self, content: &str, ctx: &EvalContext) -> f64 {
        let heading_count = self.heading_re.find_iter(content).count();
        let mut score = 3.0 + (heading_count.min(4) as f64 * 1.2);
        if let Some(topic) = &ctx.topic {
            let lead: String = content.chars().take(300).collect::<String>().to_lowercase();
            if topic
                .to_lowercase()
                .split_whitespace()
                .any(|k| k.len() > 2 && lead.contains(k))
            {
                score += 2.0;
            }
        }
        score
    }

    /// Long-word ratio and sentence-length variance.
    fn readability(&self, words: &[&str], sentences: &[&str]) -> f64 {
        if words.is_empty() || sentences.is_empty() {
            return 0.0;
        }
        let long_words = words.iter().filter(|w| w.len() > 10).count();
        let long_ratio = long_words as f64 / words.len() as f64;
        let base = if long_ratio < 0.05 {
            8.0
        } else if long_ratio < 0.12 {
            6.5
        } else {
            4.0
        };

        // Reward varied sentence lengths.
        let lengths: Vec<f64> = sentences
            .iter()
            .map(|s| s.split_whitespace().count() as f64)
            .collect();
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        let variance =
            lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
        base + if variance > 4.0 { 1.5 } else { 0.0 }
    }

    /// Questions, CTAs and second-person address.
    fn engagement(&self, content: &str, sentences: &[&str]) -> f64 {
        if sentences.is_empty() {
            return 0.0;
        }
        let questions = content.matches('?').count().min(3);
        let ctas = self.cta_re.find_iter(content).count().min(2);
        let lower = content.to_lowercase();
        let second_person = lower.matches("you").count().min(10);
        3.0 + questions as f64 * 1.2 + ctas as f64 * 1.5 + second_person as f64 * 0.25
    }
}

impl Default for PatternEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QualityEvaluator for PatternEvaluator {
    async fn evaluate(
        &self,
        content: &str,
        ctx: &EvalContext,
    ) -> Result<QualityScore, EvaluateError> {
        if content.trim().is_empty() {
            return Err(EvaluateError::EmptyContent);
        }
        Ok(QualityScore::from_criteria(
            self.score(content, ctx),
            EvaluationMethod::Pattern,
        ))
    }
}

/// LLM-backed evaluator. Asks the model for a JSON scores object; any
/// malformed reply falls back to the pattern evaluator so the gate always
/// produces a verdict.
pub struct LlmEvaluator {
    model: Arc<dyn TextModel>,
    fallback: PatternEvaluator,
}

impl LlmEvaluator {
    /// Create an LLM evaluator.
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            fallback: PatternEvaluator::new(),
        }
    }

    fn build_prompt(content: &str, ctx: &EvalContext) -> String {
        let mut prompt = String::from(
            "Score the following content on each criterion from 0 to 10. \
             Return ONLY a JSON object with keys: clarity, accuracy, completeness, \
             relevance, seo_quality, readability, engagement.\n\n",
        );
        if let Some(topic) = &ctx.topic {
            prompt.push_str(&format!("Topic: {}\n", topic));
        }
        prompt.push_str("\nContent:\n");
        prompt.push_str(content);
        prompt
    }

    fn parse_scores(reply: &str) -> Option<BTreeMap<Criterion, f64>> {
        // Models sometimes wrap the JSON in prose; take the first object.
        let start = reply.find('{')?;
        let end = reply.rfind('}')?;
        let parsed: serde_json::Value = serde_json::from_str(&reply[start..=end]).ok()?;
        let object = parsed.as_object()?;

        let mut criteria = BTreeMap::new();
        for criterion in Criterion::ALL {
            let score = object.get(criterion.as_str())?.as_f64()?;
            criteria.insert(criterion, score);
        }
        Some(criteria)
    }
}

#[async_trait]
impl QualityEvaluator for LlmEvaluator {
    async fn evaluate(
        &self,
        content: &str,
        ctx: &EvalContext,
    ) -> Result<QualityScore, EvaluateError> {
        if content.trim().is_empty() {
            return Err(EvaluateError::EmptyContent);
        }

        match self.model.generate(&Self::build_prompt(content, ctx)).await {
            Ok(reply) => match Self::parse_scores(&reply.text) {
                Some(criteria) => Ok(QualityScore::from_criteria(
                    criteria,
                    EvaluationMethod::Llm,
                )),
                None => self.fallback.evaluate(content, ctx).await,
            },
            Err(err) if err.is_retryable() => Err(EvaluateError::Provider(err)),
            // Non-retryable model failures degrade to the pattern verdict.
            Err(_) => self.fallback.evaluate(content, ctx).await,
        }
    }
}

fn split_sentences(content: &str) -> Vec<&str> {
    content
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
