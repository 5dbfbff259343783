//! Staged orchestrator — the hard core.
//!
//! Drives the retrieve → web-search → synthesis pipeline under a
//! hard end-to-end deadline with cancellation, partial-failure
//! degradation, and session recording. The orchestrator owns no
//! persistent state of its own: it borrows a `Parameters` snapshot from
//! the feedback controller and a `SessionStore` handle.

pub mod deadline;
pub mod regenerate;
pub mod workers;

use crate::domain::{
    Category, Chunk, OrchestrationResult, Parameters, Query, Source, SynthesisMetadata, SynthesizedResponse,
};
use crate::error::CoreError;
use crate::retrieval::{self, RetrievalConfig};
use crate::session::{Message, SessionStore};
use deadline::Deadline;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use workers::{ChunkRef, RetrieveWorker, SynthesisWorker, SynthesizeRequest, WebResultRef, WebSearchWorker};

/// Static timing policy. `Parameters` carries the tunable scoring
/// thresholds; this struct carries the budget constants that the adaptive
/// controller does not touch.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub end_to_end: Duration,
    pub min_synth_reserve: Duration,
    pub call_reserve: Duration,
    pub retrieve_per_call_max: Duration,
    pub web_per_call_max: Duration,
    pub synth_per_call_max: Duration,
    pub base_temperature: f64,
    pub max_tokens: u32,
    pub model: String,
    pub max_web_results: usize,
    pub freshness_keywords: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            end_to_end: Duration::from_secs(18),
            min_synth_reserve: Duration::from_secs(4),
            call_reserve: Duration::from_millis(500),
            retrieve_per_call_max: Duration::from_secs(8),
            web_per_call_max: Duration::from_secs(6),
            synth_per_call_max: Duration::from_secs(10),
            base_temperature: 0.3,
            max_tokens: 2000,
            model: "gpt-4o".to_string(),
            max_web_results: 3,
            freshness_keywords: vec!["latest".to_string(), "current".to_string(), "newest".to_string(), "today".to_string()],
        }
    }
}

/// Dispatches a worker future onto its own task and races it against the
/// orchestration deadline through a dedicated single-producer channel:
/// the orchestrator never shares mutable state with a worker call, it
/// only ever receives one message on one channel per call.
async fn race_against_deadline<T: Send + 'static>(
    deadline: Deadline,
    fut: impl Future<Output = Result<T, CoreError>> + Send + 'static,
) -> Result<T, CoreError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(async move {
        let _ = tx.send(fut.await);
    });
    tokio::select! {
        result = rx => result.unwrap_or_else(|_| Err(CoreError::Other("worker task was dropped".to_string()))),
        _ = tokio::time::sleep_until(deadline.target()) => {
            handle.abort();
            Err(CoreError::OrchestrationTimeout)
        }
    }
}

struct RetrievalOutcome {
    chunks: Vec<Chunk>,
    confidence: f64,
    errored: bool,
}

/// The staged orchestrator. Generic over the three worker traits so tests
/// can substitute deterministic fakes.
pub struct Orchestrator<R, W, S>
where
    R: RetrieveWorker + 'static,
    W: WebSearchWorker + 'static,
    S: SynthesisWorker + 'static,
{
    retrieve: Arc<R>,
    web_search: Arc<W>,
    synthesis: Arc<S>,
    sessions: Arc<dyn SessionStore>,
    retrieval_config: RetrievalConfig,
    config: OrchestratorConfig,
}

impl<R, W, S> Orchestrator<R, W, S>
where
    R: RetrieveWorker + 'static,
    W: WebSearchWorker + 'static,
    S: SynthesisWorker + 'static,
{
    pub fn new(
        retrieve: Arc<R>,
        web_search: Arc<W>,
        synthesis: Arc<S>,
        sessions: Arc<dyn SessionStore>,
        retrieval_config: RetrievalConfig,
        config: OrchestratorConfig,
    ) -> Self {
        Self { retrieve, web_search, synthesis, sessions, retrieval_config, config }
    }

    fn effective_retrieval_config(&self, parameters: &Parameters) -> RetrievalConfig {
        RetrievalConfig {
            confidence_threshold: parameters.retrieval_threshold,
            fallback_score_threshold: parameters.fallback_threshold,
            ..self.retrieval_config
        }
    }

    /// Accept a classified, non-ambiguous query plus a live session id and
    /// produce an `OrchestrationResult` within `config.end_to_end`.
    pub async fn orchestrate(&self, query: Query, session_id: &str, parameters: Parameters, category: Category) -> OrchestrationResult {
        let started = tokio::time::Instant::now();
        let deadline = Deadline::starting_now(self.config.end_to_end);

        if let Err(e) = self.sessions.append_message(session_id, Message::new_user(query.text.clone())).await {
            return OrchestrationResult::failure(format!("failed to record user message: {e}"));
        }

        let pipeline = self.run_pipeline(query, parameters, category, deadline);
        let mut result = match tokio::time::timeout(deadline.remaining(), pipeline).await {
            Ok(result) => result,
            Err(_) => OrchestrationResult::failure(CoreError::OrchestrationTimeout.to_string()),
        };
        result.execution_time_ms = started.elapsed().as_millis() as u64;

        if let Some(response) = &result.response {
            let assistant_text = response.main_text.clone();
            if let Err(e) = self.sessions.append_message(session_id, Message::new_assistant(assistant_text)).await {
                tracing::error!(error = %e, "failed to record assistant message after successful orchestration");
            }
        }

        result
    }

    async fn run_pipeline(&self, query: Query, parameters: Parameters, category: Category, deadline: Deadline) -> OrchestrationResult {
        let mut services_used: HashSet<String> = HashSet::new();
        let mut services_tested: HashSet<String> = HashSet::new();
        let effective_retrieval = self.effective_retrieval_config(&parameters);

        // Stage A — retrieval.
        let retrieval = self.stage_retrieve(&query, &effective_retrieval, &parameters, deadline, &mut services_used, &mut services_tested).await;

        // Stage gate: if too little budget remains, skip A4 (already
        // folded into stage_retrieve) and B, go straight to synthesis.
        let remaining_before_web = deadline.remaining();
        let skip_to_synthesis = remaining_before_web <= self.config.min_synth_reserve;

        let mut web_results = Vec::new();
        if !skip_to_synthesis {
            let should_search_web = retrieval::freshness_detected(&query.text, &self.config.freshness_keywords, None)
                || retrieval.confidence <= parameters.web_search_threshold
                || retrieval.errored;

            if should_search_web {
                services_tested.insert("websearch".to_string());
                match self.stage_web_search(&query, deadline).await {
                    Ok(results) => {
                        if !results.is_empty() {
                            services_used.insert("websearch".to_string());
                        }
                        web_results = results;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "web search stage failed, continuing with empty results");
                    }
                }
            }
        }

        if retrieval.chunks.is_empty() && web_results.is_empty() && retrieval.errored {
            return deterministic_no_context_response(category);
        }

        // Stage C — synthesis.
        match self.stage_synthesize(&query, &retrieval.chunks, &web_results, &parameters, None, deadline).await {
            Ok(response) => {
                services_used.insert("synthesize".to_string());
                let fallback_used = retrieval.errored || (retrieval.chunks.is_empty() && !web_results.is_empty());
                OrchestrationResult { response: Some(response), error: None, services_used, services_tested, execution_time_ms: 0, fallback_used }
            }
            Err(e) if e.is_locally_recoverable() => {
                services_tested.insert("synthesize".to_string());
                let mut result = deterministic_stitched_response(&retrieval.chunks, &web_results, category);
                result.services_used = services_used;
                result.services_tested = services_tested;
                result
            }
            Err(e) => OrchestrationResult::failure(e.to_string()),
        }
    }

    async fn stage_retrieve(
        &self,
        query: &Query,
        retrieval_config: &RetrievalConfig,
        parameters: &Parameters,
        deadline: Deadline,
        services_used: &mut HashSet<String>,
        services_tested: &mut HashSet<String>,
    ) -> RetrievalOutcome {
        services_tested.insert("retrieve".to_string());
        let budget = deadline.child_budget(self.config.call_reserve, self.config.retrieve_per_call_max);
        let request = workers::RetrieveRequest {
            query: query.text.clone(),
            filters: if query.filters.is_empty() { None } else { Some(query.filters.clone()) },
            max_chunks: retrieval_config.max_chunks,
            embedding: None,
        };

        let retrieve = self.retrieve.clone();
        let first_call = race_against_deadline(deadline, async move { retrieve.search(request, budget).await }).await;

        let mut errored = false;
        let chunks = match first_call {
            Ok(response) => {
                services_used.insert("retrieve".to_string());
                let decision = retrieval::fallback_decision(&response.chunks, retrieval_config);
                if decision.apply_fallback && deadline.remaining() > self.config.min_synth_reserve {
                    let widened_max = (retrieval_config.max_chunks as i64 + parameters.chunk_limit_adjust as i64).max(1) as usize;
                    let widened_request = workers::RetrieveRequest {
                        query: query.text.clone(),
                        filters: None,
                        max_chunks: widened_max,
                        embedding: None,
                    };
                    let retrieve = self.retrieve.clone();
                    let widened_budget = deadline.child_budget(self.config.call_reserve, self.config.retrieve_per_call_max);
                    match race_against_deadline(deadline, async move { retrieve.search(widened_request, widened_budget).await }).await {
                        Ok(widened_response) => {
                            let mut merged = response.chunks;
                            merged.extend(widened_response.chunks);
                            merged
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "widened retrieve failed, keeping original results");
                            response.chunks
                        }
                    }
                } else {
                    response.chunks
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "retrieve stage failed entirely");
                errored = true;
                Vec::new()
            }
        };

        let confidence = if chunks.is_empty() { 0.0 } else { chunks.iter().map(|c| c.score).sum::<f64>() / chunks.len() as f64 };
        let filtered = retrieval::filter_by_confidence(chunks, retrieval_config.confidence_threshold);

        RetrievalOutcome { chunks: filtered, confidence, errored }
    }

    async fn stage_web_search(&self, query: &Query, deadline: Deadline) -> Result<Vec<crate::domain::WebResult>, CoreError> {
        let budget = deadline.child_budget(self.config.call_reserve, self.config.web_per_call_max);
        let request = workers::WebSearchRequest { query: query.text.clone(), force_search: None };
        let web = self.web_search.clone();
        let response = race_against_deadline(deadline, async move { web.search(request, budget).await }).await?;
        Ok(response.results.into_iter().take(self.config.max_web_results).collect())
    }

    async fn stage_synthesize(
        &self,
        query: &Query,
        chunks: &[Chunk],
        web_results: &[crate::domain::WebResult],
        parameters: &Parameters,
        contrast: Option<String>,
        deadline: Deadline,
    ) -> Result<SynthesizedResponse, CoreError> {
        let budget = deadline.child_budget(self.config.call_reserve, self.config.synth_per_call_max);
        let request = SynthesizeRequest {
            query: query.text.clone(),
            chunks: chunks.iter().map(ChunkRef::from).collect(),
            web_results: web_results.iter().map(WebResultRef::from).collect(),
            temperature: (self.config.base_temperature + parameters.temperature_adjust).clamp(0.0, 1.0),
            max_tokens: self.config.max_tokens,
            model: self.config.model.clone(),
            contrast,
        };
        let synthesis = self.synthesis.clone();
        race_against_deadline(deadline, async move { synthesis.synthesize(request, budget).await }).await
    }
}

fn deterministic_no_context_response(category: Category) -> OrchestrationResult {
    let response = SynthesizedResponse {
        main_text: "I couldn't retrieve any relevant context for this question right now. Please try rephrasing or ask again shortly.".to_string(),
        diagram_code: None,
        sources: Vec::new(),
        metadata: SynthesisMetadata {
            model: "none".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            temperature: 0.0,
            pipeline_decision: format!("no-context:{category:?}"),
            processing_stats: Default::default(),
        },
    };
    OrchestrationResult { response: Some(response), error: None, services_used: HashSet::new(), services_tested: HashSet::new(), execution_time_ms: 0, fallback_used: true }
}

/// Deterministic degraded response assembled locally when the synthesis
/// worker fails: stitches together the top-3 chunk
/// texts without calling out to any model.
fn deterministic_stitched_response(chunks: &[Chunk], web_results: &[crate::domain::WebResult], category: Category) -> OrchestrationResult {
    let top_texts: Vec<String> = chunks.iter().take(3).map(|c| c.text.clone()).collect();
    let main_text = if top_texts.is_empty() {
        "I found some information but could not synthesize a complete answer right now.".to_string()
    } else {
        format!("Here is what I found, summarized from the top sources:\n\n{}", top_texts.join("\n\n"))
    };
    let sources: Vec<Source> = chunks.iter().take(3).cloned().map(Source::Chunk).chain(web_results.iter().cloned().map(Source::Web)).collect();
    let response = SynthesizedResponse {
        main_text,
        diagram_code: None,
        sources,
        metadata: SynthesisMetadata {
            model: "none".to_string(),
            input_tokens: 0,
            output_tokens: 0,
            temperature: 0.0,
            pipeline_decision: format!("stitched-fallback:{category:?}"),
            processing_stats: Default::default(),
        },
    };
    OrchestrationResult { response: Some(response), error: None, services_used: HashSet::new(), services_tested: HashSet::new(), execution_time_ms: 0, fallback_used: true }
}
