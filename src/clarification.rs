//! Clarification analyzer.
//!
//! Stateless: takes the query and prior session messages, decides whether
//! the pipeline should short-circuit and ask the user to disambiguate
//! before any retrieval/synthesis work runs.

use crate::session::Message;
use serde::{Deserialize, Serialize};

const AMBIGUITY_THRESHOLD: f64 = 0.6;
const COMPLETENESS_THRESHOLD: f64 = 0.4;
const MAX_QUESTIONS: usize = 3;

const AMBIGUOUS_TERMS: &[&str] = &[
    "it", "this", "that", "the thing", "the service", "the issue", "migrate it",
];

const VAGUE_OPENERS: &[&str] = &["help", "how do i do this", "what should i do", "fix it"];

/// Result of the clarification analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClarificationAnalysis {
    pub requires_clarification: bool,
    pub is_ambiguous: bool,
    pub is_incomplete: bool,
    pub ambiguity_score: f64,
    pub completeness_score: f64,
    pub questions: Vec<String>,
    pub suggestions: Vec<String>,
    pub quick_options: Vec<String>,
}

fn ambiguity_score(normalized: &str, word_count: usize) -> f64 {
    let pronoun_hits = AMBIGUOUS_TERMS.iter().filter(|t| normalized.contains(*t)).count() as f64;
    let shortness_penalty = if word_count <= 3 { 0.3 } else { 0.0 };
    (pronoun_hits * 0.25 + shortness_penalty).min(1.0)
}

/// Completeness is the complement of "vagueness": a short, opener-only
/// query with no concrete nouns scores low.
fn completeness_score(normalized: &str, word_count: usize) -> f64 {
    let vague_hit = VAGUE_OPENERS.iter().any(|v| normalized.contains(*v));
    let mut score = (word_count as f64 / 12.0).min(1.0);
    if vague_hit {
        score *= 0.3;
    }
    score
}

fn provider_missing(normalized: &str) -> bool {
    !["aws", "azure", "gcp", "amazon", "microsoft", "google"]
        .iter()
        .any(|p| normalized.contains(p))
}

/// Analyze a query plus prior conversation turns for ambiguity and
/// incompleteness. Pure function of its inputs.
pub fn analyze(query_text: &str, prior_messages: &[Message]) -> ClarificationAnalysis {
    let normalized = query_text.trim().to_lowercase();
    let word_count = normalized.split_whitespace().count().max(1);

    let ambiguity = ambiguity_score(&normalized, word_count);
    let completeness = completeness_score(&normalized, word_count);

    // A follow-up in an ongoing conversation inherits context from prior
    // turns, which lowers the bar for treating a short query as complete.
    let has_prior_context = !prior_messages.is_empty();
    let is_ambiguous = ambiguity >= AMBIGUITY_THRESHOLD && !has_prior_context;
    let is_incomplete = completeness < COMPLETENESS_THRESHOLD && !has_prior_context;

    let requires_clarification = is_ambiguous || is_incomplete;

    let mut questions = Vec::new();
    let mut suggestions = Vec::new();
    let mut quick_options = Vec::new();

    if requires_clarification {
        if provider_missing(&normalized) {
            questions.push("Which cloud provider are you targeting — AWS, Azure, or GCP?".to_string());
            quick_options.push("AWS".to_string());
            quick_options.push("Azure".to_string());
            quick_options.push("GCP".to_string());
        }
        if is_ambiguous {
            questions.push("Could you clarify what 'it' or 'this' refers to in your question?".to_string());
            suggestions.push("Restate the resource or service you mean by name.".to_string());
        }
        if is_incomplete {
            questions.push("What outcome are you trying to achieve (migration, cost reduction, security review, etc.)?".to_string());
            suggestions.push("Add the workload size, region, or constraints relevant to your question.".to_string());
        }
        questions.truncate(MAX_QUESTIONS);
        quick_options.truncate(MAX_QUESTIONS);
    }

    ClarificationAnalysis {
        requires_clarification,
        is_ambiguous,
        is_incomplete,
        ambiguity_score: ambiguity,
        completeness_score: completeness,
        questions,
        suggestions,
        quick_options,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vague_opener_requires_clarification() {
        let analysis = analyze("help", &[]);
        assert!(analysis.requires_clarification);
        assert!(!analysis.questions.is_empty());
    }

    #[test]
    fn detailed_query_does_not_require_clarification() {
        let analysis = analyze(
            "Generate a lift-and-shift plan for 120 on-prem Windows and Linux VMs to AWS",
            &[],
        );
        assert!(!analysis.requires_clarification);
    }

    #[test]
    fn prior_context_suppresses_short_followup_clarification() {
        let prior = vec![Message::new_user("Design a DR plan for our AWS RDS database".to_string())];
        let analysis = analyze("what about failover?", &prior);
        assert!(!analysis.requires_clarification);
    }

    #[test]
    fn questions_and_quick_options_are_capped() {
        let analysis = analyze("fix it", &[]);
        assert!(analysis.questions.len() <= MAX_QUESTIONS);
        assert!(analysis.quick_options.len() <= MAX_QUESTIONS);
    }
}
