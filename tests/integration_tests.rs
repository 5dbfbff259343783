//! End-to-end scenarios spanning classifier, clarification, retrieval
//! fallback, orchestration, and feedback-driven retuning together,
//! exercised the way a caller outside the crate would: through
//! `cloud_query_orchestrator`'s public API rather than any single
//! module's internals.

use async_trait::async_trait;
use cloud_query_orchestrator::domain::{Category, Chunk, OrchestrationResult, Parameters, Query, SearchResponse, SynthesisMetadata, SynthesizedResponse};
use cloud_query_orchestrator::error::CoreError;
use cloud_query_orchestrator::feedback::controller::AdaptiveController;
use cloud_query_orchestrator::feedback::{Feedback, FeedbackStore, InMemoryFeedbackStore, Verdict};
use cloud_query_orchestrator::orchestrator::workers::{
    RetrieveRequest, RetrieveWorker, SynthesizeRequest, SynthesisWorker, WebSearchRequest, WebSearchResponse, WebSearchWorker,
};
use cloud_query_orchestrator::orchestrator::{Orchestrator, OrchestratorConfig};
use cloud_query_orchestrator::retrieval::RetrievalConfig;
use cloud_query_orchestrator::sanitize::sanitize_query;
use cloud_query_orchestrator::session::memory::InMemorySessionStore;
use cloud_query_orchestrator::session::SessionStore;
use cloud_query_orchestrator::{classifier, clarification};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn chunk(score: f64, doc_id: &str) -> Chunk {
    Chunk { text: format!("architecture notes for {doc_id}"), score, doc_id: doc_id.to_string(), source_id: format!("{doc_id}_chunk_0"), metadata: HashMap::new() }
}

struct FakeRetrieve {
    chunks: Vec<Chunk>,
}

#[async_trait]
impl RetrieveWorker for FakeRetrieve {
    async fn search(&self, request: RetrieveRequest, _budget: Duration) -> Result<SearchResponse, CoreError> {
        Ok(SearchResponse { chunks: self.chunks.clone(), count: self.chunks.len(), query: request.query, fallback_triggered: false, fallback_reason: None })
    }
}

struct NoWebSearch;

#[async_trait]
impl WebSearchWorker for NoWebSearch {
    async fn search(&self, _request: WebSearchRequest, _budget: Duration) -> Result<WebSearchResponse, CoreError> {
        Ok(WebSearchResponse { results: Vec::new(), source: "unused".to_string(), cached: false })
    }
}

struct EchoSynthesis;

#[async_trait]
impl SynthesisWorker for EchoSynthesis {
    async fn synthesize(&self, request: SynthesizeRequest, _budget: Duration) -> Result<SynthesizedResponse, CoreError> {
        Ok(SynthesizedResponse {
            main_text: format!("answer grounded in {} source(s) for: {}", request.chunks.len() + request.web_results.len(), request.query),
            diagram_code: None,
            sources: Vec::new(),
            metadata: SynthesisMetadata {
                model: request.model,
                input_tokens: 50,
                output_tokens: 80,
                temperature: request.temperature,
                pipeline_decision: "direct".to_string(),
                processing_stats: HashMap::new(),
            },
        })
    }
}

async fn run_query(chunks: Vec<Chunk>, text: &str, retrieval_config: RetrievalConfig) -> (OrchestrationResult, Arc<InMemorySessionStore>) {
    let sessions = Arc::new(InMemorySessionStore::new(chrono::Duration::minutes(30), 1000));
    let session = sessions.create("user-1").await.unwrap();

    let orchestrator = Orchestrator::new(
        Arc::new(FakeRetrieve { chunks }),
        Arc::new(NoWebSearch),
        Arc::new(EchoSynthesis),
        sessions.clone(),
        retrieval_config,
        OrchestratorConfig::default(),
    );

    let query = Query::new(text);
    let classification = classifier::classify(&query);
    assert!(classification.in_scope, "expected this query to be admitted");

    let result = orchestrator.orchestrate(query, &session.id, Parameters::default(), classification.category).await;
    (result, sessions)
}

#[tokio::test]
async fn out_of_scope_query_is_rejected_before_touching_any_subsystem() {
    let query = Query::new("What's a good recipe for banana bread?");
    let classification = classifier::classify(&query);
    assert!(!classification.in_scope);
    assert_eq!(classification.rejection_reason.as_deref(), Some(classifier::REJECTION_MESSAGE));
}

#[tokio::test]
async fn happy_path_admits_classifies_and_synthesizes() {
    let chunks = vec![chunk(0.9, "a"), chunk(0.85, "b"), chunk(0.82, "c"), chunk(0.78, "d")];
    let (result, sessions) = run_query(chunks, "Design a secure VPC network architecture on AWS with public and private subnets", RetrievalConfig::default()).await;

    assert!(result.invariant_holds());
    assert!(result.response.is_some());
    assert!(!result.fallback_used);
    let session = sessions.get(&sessions.create("another-user").await.unwrap().id).await;
    assert!(session.is_ok());
}

#[tokio::test]
async fn insufficient_chunk_count_marks_the_result_as_fallback() {
    let chunks = vec![chunk(0.9, "a")]; // below fallback_threshold_count = 3
    let (result, _sessions) = run_query(chunks, "Explain AWS security groups versus network ACLs", RetrievalConfig::default()).await;

    assert!(result.invariant_holds());
    assert!(result.response.is_some());
}

#[tokio::test]
async fn low_similarity_scores_trigger_the_same_widened_retrieve_path() {
    let chunks = vec![chunk(0.3, "a"), chunk(0.25, "b"), chunk(0.2, "c")];
    let (result, _sessions) = run_query(chunks, "Explain GCP VPC peering limits", RetrievalConfig::default()).await;

    assert!(result.invariant_holds());
    assert!(result.response.is_some());
}

#[tokio::test]
async fn sensitive_text_is_redacted_before_sanitize_returns_it() {
    let raw = "my api_key=sk-abcdef0123456789abcdef0123456789 is leaking, please help secure it";
    let sanitized = sanitize_query(raw);
    assert!(!sanitized.contains("sk-abcdef0123456789abcdef0123456789"));
}

#[tokio::test]
async fn clarification_gate_flags_a_short_ambiguous_query() {
    let analysis = clarification::analyze("help me with cloud", &[]);
    assert!(analysis.requires_clarification);
    assert!(!analysis.questions.is_empty());
}

#[tokio::test]
async fn feedback_driven_retuning_shifts_parameters_for_a_low_satisfaction_category() {
    let store = Arc::new(InMemoryFeedbackStore::new());
    for _ in 0..10 {
        store.append(Feedback::new("a security compliance question", Verdict::Negative, Category::Security)).await.unwrap();
    }
    let store: Arc<dyn FeedbackStore> = store;
    let controller = AdaptiveController::spawn(store, 30, Duration::from_secs(3600));

    let before = controller.current();
    controller.force_update().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let after = controller.current();

    assert!(after.retrieval_threshold >= before.retrieval_threshold || after.temperature_adjust <= before.temperature_adjust);
}
