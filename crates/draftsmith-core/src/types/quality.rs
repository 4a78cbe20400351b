//! Quality score type definitions
//!
//! The QualityScore is the verdict of the quality gate: seven weighted
//! criteria, an overall mean, and deterministic improvement suggestions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Overall score at or above this value passes the gate. System-wide bar,
/// not configurable per call.
pub const PASSING_THRESHOLD: f64 = 7.0;

/// Criteria scoring below this value contribute a suggestion.
pub const SUGGESTION_THRESHOLD: f64 = 6.0;

/// The seven scoring criteria.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Clarity,
    Accuracy,
    Completeness,
    Relevance,
    SeoQuality,
    Readability,
    Engagement,
}

impl Criterion {
    /// All criteria, in stable order.
    pub const ALL: [Criterion; 7] = [
        Criterion::Clarity,
        Criterion::Accuracy,
        Criterion::Completeness,
        Criterion::Relevance,
        Criterion::SeoQuality,
        Criterion::Readability,
        Criterion::Engagement,
    ];

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Clarity => "clarity",
            Criterion::Accuracy => "accuracy",
            Criterion::Completeness => "completeness",
            Criterion::Relevance => "relevance",
            Criterion::SeoQuality => "seo_quality",
            Criterion::Readability => "readability",
            Criterion::Engagement => "engagement",
        }
    }

    /// Fixed improvement suggestion for a low score on this criterion.
    /// Kept static so refinement prompts are reproducible for the same
    /// content.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Criterion::Clarity => "Shorten long sentences and break up dense passages",
            Criterion::Accuracy => "Add concrete figures, dates or cited sources",
            Criterion::Completeness => "Expand thin sections to cover the topic fully",
            Criterion::Relevance => "Keep every section focused on the requested topic",
            Criterion::SeoQuality => {
                "Add descriptive headings and mention the topic early in the text"
            }
            Criterion::Readability => "Prefer plain words and vary sentence length",
            Criterion::Engagement => "Address the reader directly and end with a call to action",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which evaluation strategy produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMethod {
    /// Deterministic text heuristics
    Pattern,
    /// Delegated to an external model
    Llm,
}

/// The quality gate verdict for a piece of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityScore {
    /// Arithmetic mean of the criteria, 0-10
    pub overall: f64,
    /// Per-criterion scores, 0-10 each
    pub criteria: BTreeMap<Criterion, f64>,
    /// Whether the content passes the gate (overall >= 7.0)
    pub passing: bool,
    /// Human-readable summary of the verdict
    pub feedback: String,
    /// Deterministic improvement suggestions for low-scoring criteria
    pub suggestions: Vec<String>,
    /// Strategy that produced this score
    pub method: EvaluationMethod,
    /// When the evaluation ran
    pub evaluated_at: DateTime<Utc>,
}

impl QualityScore {
    /// Build a score from per-criterion values, deriving overall / passing /
    /// feedback / suggestions. Scores are clamped into [0, 10].
    pub fn from_criteria(criteria: BTreeMap<Criterion, f64>, method: EvaluationMethod) -> Self {
        let criteria: BTreeMap<Criterion, f64> = criteria
            .into_iter()
            .map(|(k, v)| (k, clamp_score(v)))
            .collect();

        let overall = if criteria.is_empty() {
            0.0
        } else {
            criteria.values().sum::<f64>() / criteria.len() as f64
        };
        let passing = overall >= PASSING_THRESHOLD;

        let weak: Vec<Criterion> = criteria
            .iter()
            .filter(|(_, score)| **score < SUGGESTION_THRESHOLD)
            .map(|(criterion, _)| *criterion)
            .collect();
        let suggestions = weak
            .iter()
            .map(|c| c.suggestion().to_string())
            .collect::<Vec<_>>();

        let feedback = if passing && weak.is_empty() {
            format!("Content passes the quality bar at {:.1}/10", overall)
        } else if passing {
            format!(
                "Content passes at {:.1}/10 but is weak on: {}",
                overall,
                join_criteria(&weak)
            )
        } else {
            format!(
                "Content scores {:.1}/10, below the {:.1} bar; weakest areas: {}",
                overall,
                PASSING_THRESHOLD,
                if weak.is_empty() {
                    "overall depth".to_string()
                } else {
                    join_criteria(&weak)
                }
            )
        };

        Self {
            overall,
            criteria,
            passing,
            feedback,
            suggestions,
            method,
            evaluated_at: Utc::now(),
        }
    }

    /// Get a single criterion score.
    pub fn criterion(&self, criterion: Criterion) -> Option<f64> {
        self.criteria.get(&criterion).copied()
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 10.0)
    }
}

fn join_criteria(criteria: &[Criterion]) -> String {
    criteria
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(score: f64) -> BTreeMap<Criterion, f64> {
        Criterion::ALL.iter().map(|c| (*c, score)).collect()
    }

    #[test]
    fn test_overall_is_mean_and_passing_at_threshold() {
        let score = QualityScore::from_criteria(uniform(7.0), EvaluationMethod::Pattern);
        assert!((score.overall - 7.0).abs() < 1e-9);
        assert!(score.passing);

        let score = QualityScore::from_criteria(uniform(6.9), EvaluationMethod::Pattern);
        assert!(!score.passing);
    }

    #[test]
    fn test_suggestions_derive_from_weak_criteria() {
        let mut criteria = uniform(8.0);
        criteria.insert(Criterion::Engagement, 4.0);
        criteria.insert(Criterion::Clarity, 5.5);
        let score = QualityScore::from_criteria(criteria, EvaluationMethod::Pattern);

        assert_eq!(score.suggestions.len(), 2);
        assert!(score
            .suggestions
            .contains(&Criterion::Clarity.suggestion().to_string()));
        assert!(score
            .suggestions
            .contains(&Criterion::Engagement.suggestion().to_string()));
    }

    #[test]
    fn test_scores_are_clamped() {
        let mut criteria = uniform(5.0);
        criteria.insert(Criterion::Accuracy, 14.0);
        criteria.insert(Criterion::Relevance, -3.0);
        let score = QualityScore::from_criteria(criteria, EvaluationMethod::Llm);

        assert_eq!(score.criterion(Criterion::Accuracy), Some(10.0));
        assert_eq!(score.criterion(Criterion::Relevance), Some(0.0));
    }
}
