//! Retrieval decision layer.
//!
//! Pure functions consumed by the orchestrator: freshness detection, the
//! fallback predicate, chunk confidence filtering, and doc-id extraction.
//! No I/O, no shared state — every function here is a deterministic
//! function of its arguments.

use crate::domain::Chunk;
use regex::Regex;
use std::sync::OnceLock;

fn chunk_suffix_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_chunk_\d+$").unwrap())
}

/// Static retrieval configuration baseline. The adaptive controller's
/// `Parameters` nudge `confidence_threshold`/`fallback_score_threshold`
/// indirectly through the orchestrator before this layer sees them.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    pub max_chunks: usize,
    pub fallback_threshold_count: usize,
    pub confidence_threshold: f64,
    pub fallback_score_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_chunks: 5,
            fallback_threshold_count: 3,
            confidence_threshold: 0.7,
            fallback_score_threshold: 0.7,
        }
    }
}

/// True if `query` contains any freshness keyword (case-insensitive
/// substring match), unless `force_search` is explicitly set to `false`.
/// A `force_search = Some(true)` always wins regardless of keyword match.
pub fn freshness_detected(query: &str, freshness_keywords: &[String], force_search: Option<bool>) -> bool {
    if let Some(forced) = force_search {
        return forced;
    }
    let normalized = query.to_lowercase();
    freshness_keywords.iter().any(|kw| normalized.contains(&kw.to_lowercase()))
}

/// Outcome of the fallback predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackDecision {
    pub apply_fallback: bool,
    pub reason: String,
}

fn mean_score(chunks: &[Chunk]) -> f64 {
    if chunks.is_empty() {
        return 0.0;
    }
    chunks.iter().map(|c| c.score).sum::<f64>() / chunks.len() as f64
}

/// Decide whether a widened re-retrieve is warranted: too few chunks, or
/// an acceptable count with too-low average similarity. Exactly one reason
/// string format is produced per branch; when both conditions hold in the
/// same pass, the low-count reason takes priority.
pub fn fallback_decision(chunks: &[Chunk], config: &RetrievalConfig) -> FallbackDecision {
    let count = chunks.len();
    if count < config.fallback_threshold_count {
        return FallbackDecision {
            apply_fallback: true,
            reason: format!(
                "insufficient results ({count} < {threshold})",
                threshold = config.fallback_threshold_count
            ),
        };
    }

    let avg_similarity = mean_score(chunks);
    if avg_similarity < config.fallback_score_threshold {
        return FallbackDecision {
            apply_fallback: true,
            reason: format!(
                "low average similarity score ({avg_similarity:.3} < {threshold:.3})",
                threshold = config.fallback_score_threshold
            ),
        };
    }

    FallbackDecision { apply_fallback: false, reason: String::new() }
}

/// Drop chunks scoring below `confidence_threshold`, preserving order.
/// Dropped chunks still count toward the fallback decision, which must be
/// evaluated on the full set *before* calling this function.
pub fn filter_by_confidence(chunks: Vec<Chunk>, confidence_threshold: f64) -> Vec<Chunk> {
    chunks.into_iter().filter(|c| c.score >= confidence_threshold).collect()
}

/// Strip a trailing `_chunk_\d+` suffix from a chunk id. Ids without that
/// suffix are returned unchanged.
pub fn extract_doc_id(chunk_id: &str) -> String {
    chunk_suffix_pattern().replace(chunk_id, "").into_owned()
}
