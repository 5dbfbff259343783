//! Cross-cutting data model shared by the classifier, retrieval decision
//! layer, orchestrator, and session store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A free-form user query plus routing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub filters: HashMap<String, String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: None,
            conversation_id: None,
            filters: HashMap::new(),
        }
    }

    /// Trimmed, lower-cased form used by the classifier and freshness
    /// detector for case-insensitive substring matching.
    pub fn normalized(&self) -> String {
        self.text.trim().to_lowercase()
    }
}

/// Adaptive tuning vector retuned by the feedback controller and
/// consumed by the orchestrator on every query. Each scalar field is
/// clamped to its documented range; `chunk_limit_adjust` is the one
/// integer field among otherwise-float parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub retrieval_threshold: f64,
    pub fallback_threshold: f64,
    pub temperature_adjust: f64,
    pub chunk_limit_adjust: i32,
    pub web_search_threshold: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            retrieval_threshold: 0.7,
            fallback_threshold: 0.5,
            temperature_adjust: 0.0,
            chunk_limit_adjust: 0,
            web_search_threshold: 0.6,
        }
    }
}

impl Parameters {
    pub const RETRIEVAL_THRESHOLD_RANGE: (f64, f64) = (0.3, 0.9);
    pub const FALLBACK_THRESHOLD_RANGE: (f64, f64) = (0.2, 0.8);
    pub const TEMPERATURE_ADJUST_RANGE: (f64, f64) = (-0.5, 0.5);
    pub const CHUNK_LIMIT_ADJUST_RANGE: (i32, i32) = (-3, 5);
    pub const WEB_SEARCH_THRESHOLD_RANGE: (f64, f64) = (0.2, 0.9);

    /// Clamp every field to its documented range. Called after every
    /// controller-side mutation so an out-of-range intermediate value can
    /// never reach a reader.
    pub fn clamped(mut self) -> Self {
        let (lo, hi) = Self::RETRIEVAL_THRESHOLD_RANGE;
        self.retrieval_threshold = self.retrieval_threshold.clamp(lo, hi);
        let (lo, hi) = Self::FALLBACK_THRESHOLD_RANGE;
        self.fallback_threshold = self.fallback_threshold.clamp(lo, hi);
        let (lo, hi) = Self::TEMPERATURE_ADJUST_RANGE;
        self.temperature_adjust = self.temperature_adjust.clamp(lo, hi);
        let (lo, hi) = Self::CHUNK_LIMIT_ADJUST_RANGE;
        self.chunk_limit_adjust = self.chunk_limit_adjust.clamp(lo, hi);
        let (lo, hi) = Self::WEB_SEARCH_THRESHOLD_RANGE;
        self.web_search_threshold = self.web_search_threshold.clamp(lo, hi);
        self
    }
}

/// Query topical category, per the classifier's dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Aws,
    Azure,
    Gcp,
    Migration,
    Hybrid,
    Security,
    DisasterRecovery,
    Networking,
    Storage,
    Compute,
    CostOptimization,
    GeneralCloud,
    Empty,
    Rejected,
    General,
    NonCloud,
}

/// Outcome of the query admission classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub in_scope: bool,
    pub category: Category,
    pub confidence: f64,
    pub rejection_reason: Option<String>,
}

impl ClassificationResult {
    /// Invariant: `in_scope ⇒ rejection_reason is absent`.
    pub fn invariant_holds(&self) -> bool {
        !self.in_scope || self.rejection_reason.is_none()
    }
}

/// A scored text fragment returned by the retrieve worker.
///
/// `score` follows the similarity convention: 1.0 = identical. Callers that
/// receive a distance from a downstream worker must normalize it with
/// [`similarity_from_distance`] before constructing a `Chunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub score: f64,
    pub doc_id: String,
    pub source_id: String,
    pub metadata: HashMap<String, String>,
}

/// Convert a downstream distance (0.0 = identical) into a similarity score
/// in `[0, 1]` (1.0 = identical).
pub fn similarity_from_distance(distance: f64) -> f64 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Response contract for the retrieve worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub chunks: Vec<Chunk>,
    pub count: usize,
    pub query: String,
    pub fallback_triggered: bool,
    pub fallback_reason: Option<String>,
}

/// A single web-search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

/// Either kind of source a synthesized response can cite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Chunk(Chunk),
    Web(WebResult),
}

/// Metadata attached to a synthesized response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisMetadata {
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub temperature: f64,
    pub pipeline_decision: String,
    pub processing_stats: HashMap<String, String>,
}

/// Output of the synthesis worker, or of a deterministic degraded fallback
/// assembled locally by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedResponse {
    pub main_text: String,
    pub diagram_code: Option<String>,
    pub sources: Vec<Source>,
    pub metadata: SynthesisMetadata,
}

/// Final artifact returned by the orchestrator for one query.
///
/// Invariant: exactly one of `response` or `error` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub response: Option<SynthesizedResponse>,
    pub error: Option<String>,
    pub services_used: HashSet<String>,
    pub services_tested: HashSet<String>,
    pub execution_time_ms: u64,
    pub fallback_used: bool,
}

impl OrchestrationResult {
    pub fn invariant_holds(&self) -> bool {
        self.response.is_some() != self.error.is_some()
    }

    pub fn success(response: SynthesizedResponse) -> Self {
        Self {
            response: Some(response),
            error: None,
            services_used: HashSet::new(),
            services_tested: HashSet::new(),
            execution_time_ms: 0,
            fallback_used: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            response: None,
            error: Some(error.into()),
            services_used: HashSet::new(),
            services_tested: HashSet::new(),
            execution_time_ms: 0,
            fallback_used: true,
        }
    }
}
