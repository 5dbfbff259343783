//! Regeneration handling.
//!
//! A regeneration always operates against a live, stored `Session`; one
//! with no matching session is rejected as a `ValidationError` before any
//! worker is called. The `(query, preset, previous_response)` triplet
//! still arrives exactly as the caller supplies it (the caller passes the
//! response it wants contrasted against); the session only anchors
//! *where* the regenerated turn gets appended. A plain regeneration
//! re-runs only Stage C against the context already cited by
//! `previous_response`; a `deep` preset reruns the full pipeline instead.

use super::deadline::Deadline;
use super::workers::{RetrieveWorker, SynthesisWorker, WebSearchWorker};
use super::Orchestrator;
use crate::domain::{Category, Chunk, OrchestrationResult, Parameters, Query, Source, SynthesizedResponse, WebResult};
use std::collections::HashSet;

/// A named regeneration variant: a temperature nudge, an optional
/// max-tokens override, and whether it warrants a full pipeline rerun.
#[derive(Debug, Clone)]
pub struct RegenerationPreset {
    pub name: String,
    pub temperature_delta: f64,
    pub max_tokens_override: Option<u32>,
    pub deep: bool,
}

impl RegenerationPreset {
    pub fn standard() -> Self {
        Self { name: "standard".to_string(), temperature_delta: 0.0, max_tokens_override: None, deep: false }
    }

    pub fn more_creative() -> Self {
        Self { name: "more-creative".to_string(), temperature_delta: 0.2, max_tokens_override: None, deep: false }
    }

    pub fn deep_dive() -> Self {
        Self { name: "deep-dive".to_string(), temperature_delta: 0.0, max_tokens_override: Some(3000), deep: true }
    }
}

#[derive(Debug, Clone)]
pub struct RegenerationRequest {
    pub query: Query,
    pub preset: RegenerationPreset,
    pub previous_response: SynthesizedResponse,
}

fn split_previous_context(previous: &SynthesizedResponse) -> (Vec<Chunk>, Vec<WebResult>) {
    let mut chunks = Vec::new();
    let mut web_results = Vec::new();
    for source in &previous.sources {
        match source {
            Source::Chunk(chunk) => chunks.push(chunk.clone()),
            Source::Web(web) => web_results.push(web.clone()),
        }
    }
    (chunks, web_results)
}

impl<R, W, S> Orchestrator<R, W, S>
where
    R: RetrieveWorker + 'static,
    W: WebSearchWorker + 'static,
    S: SynthesisWorker + 'static,
{
    /// Regenerate a response for `(query, preset, previous_response)`.
    /// Session-aware: the regenerated assistant message replaces nothing —
    /// it is appended as a new turn once synthesis succeeds, same as any
    /// other successful orchestration.
    pub async fn regenerate(&self, request: RegenerationRequest, session_id: &str, parameters: Parameters, category: Category) -> OrchestrationResult {
        if let Err(e) = self.sessions.get(session_id).await {
            return OrchestrationResult::failure(format!("regeneration requires a live session: {e}"));
        }

        let RegenerationRequest { query, preset, previous_response } = request;
        let started = tokio::time::Instant::now();
        let deadline = Deadline::starting_now(self.config.end_to_end);

        let adjusted = Parameters {
            temperature_adjust: (parameters.temperature_adjust + preset.temperature_delta).clamp(
                Parameters::TEMPERATURE_ADJUST_RANGE.0,
                Parameters::TEMPERATURE_ADJUST_RANGE.1,
            ),
            ..parameters
        };

        let mut result = if preset.deep {
            self.run_pipeline(query, adjusted, category, deadline).await
        } else {
            let (chunks, web_results) = split_previous_context(&previous_response);
            match self
                .stage_synthesize(&query, &chunks, &web_results, &adjusted, Some(previous_response.main_text.clone()), deadline)
                .await
            {
                Ok(response) => {
                    let mut services_used = HashSet::new();
                    services_used.insert("synthesize".to_string());
                    OrchestrationResult { response: Some(response), error: None, services_used, services_tested: HashSet::new(), execution_time_ms: 0, fallback_used: false }
                }
                Err(e) => OrchestrationResult::failure(format!("regeneration synthesis failed: {e}")),
            }
        };

        result.execution_time_ms = started.elapsed().as_millis() as u64;

        if let Some(response) = &result.response {
            if let Err(e) = self.sessions.append_message(session_id, crate::session::Message::new_assistant(response.main_text.clone())).await {
                tracing::error!(error = %e, "failed to record regenerated assistant message");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SearchResponse, SynthesisMetadata, WebResult};
    use crate::orchestrator::workers::{self, RetrieveRequest, SynthesizeRequest, WebSearchRequest, WebSearchResponse};
    use crate::orchestrator::OrchestratorConfig;
    use crate::retrieval::RetrievalConfig;
    use crate::session::memory::InMemorySessionStore;
    use crate::session::SessionStore;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    struct UnusedRetrieve;
    #[async_trait]
    impl RetrieveWorker for UnusedRetrieve {
        async fn search(&self, _r: RetrieveRequest, _b: Duration) -> Result<SearchResponse, crate::error::CoreError> {
            panic!("a non-deep regeneration must not call the retrieve worker");
        }
    }

    struct UnusedWeb;
    #[async_trait]
    impl WebSearchWorker for UnusedWeb {
        async fn search(&self, _r: WebSearchRequest, _b: Duration) -> Result<WebSearchResponse, crate::error::CoreError> {
            panic!("a non-deep regeneration must not call the web worker");
        }
    }

    struct UnusedSynthesis;
    #[async_trait]
    impl SynthesisWorker for UnusedSynthesis {
        async fn synthesize(&self, _r: SynthesizeRequest, _b: Duration) -> Result<SynthesizedResponse, crate::error::CoreError> {
            panic!("a regeneration against an unknown session must not reach synthesis");
        }
    }

    struct EchoSynthesis;
    #[async_trait]
    impl SynthesisWorker for EchoSynthesis {
        async fn synthesize(&self, request: SynthesizeRequest, _b: Duration) -> Result<SynthesizedResponse, crate::error::CoreError> {
            Ok(SynthesizedResponse {
                main_text: format!("regenerated, contrast={:?}", request.contrast),
                diagram_code: None,
                sources: Vec::new(),
                metadata: SynthesisMetadata {
                    model: request.model,
                    input_tokens: 0,
                    output_tokens: 0,
                    temperature: request.temperature,
                    pipeline_decision: "regenerate".to_string(),
                    processing_stats: HashMap::new(),
                },
            })
        }
    }

    fn previous_response() -> SynthesizedResponse {
        SynthesizedResponse {
            main_text: "original answer".to_string(),
            diagram_code: None,
            sources: vec![Source::Chunk(Chunk {
                text: "original chunk".to_string(),
                score: 0.9,
                doc_id: "doc1".to_string(),
                source_id: "src".to_string(),
                metadata: HashMap::new(),
            })],
            metadata: SynthesisMetadata {
                model: "gpt-4o".to_string(),
                input_tokens: 0,
                output_tokens: 0,
                temperature: 0.3,
                pipeline_decision: "direct".to_string(),
                processing_stats: HashMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn standard_regeneration_skips_retrieve_and_web_and_passes_contrast() {
        let sessions = Arc::new(InMemorySessionStore::new(ChronoDuration::minutes(30), 1000));
        let session = sessions.create("user-1").await.unwrap();

        let orchestrator = Orchestrator::new(
            Arc::new(UnusedRetrieve),
            Arc::new(UnusedWeb),
            Arc::new(EchoSynthesis),
            sessions.clone(),
            RetrievalConfig::default(),
            OrchestratorConfig::default(),
        );

        let request = RegenerationRequest {
            query: Query::new("Regenerate with more detail on failover"),
            preset: RegenerationPreset::more_creative(),
            previous_response: previous_response(),
        };

        let result = orchestrator.regenerate(request, &session.id, Parameters::default(), Category::Aws).await;
        assert!(result.invariant_holds());
        assert!(result.response.unwrap().main_text.contains("original answer"));

        let stored = sessions.get(&session.id).await.unwrap();
        assert_eq!(stored.messages.len(), 1);
    }

    #[tokio::test]
    async fn regeneration_against_an_unknown_session_is_rejected_before_any_worker_runs() {
        let sessions = Arc::new(InMemorySessionStore::new(ChronoDuration::minutes(30), 1000));

        let orchestrator = Orchestrator::new(
            Arc::new(UnusedRetrieve),
            Arc::new(UnusedWeb),
            Arc::new(UnusedSynthesis),
            sessions,
            RetrievalConfig::default(),
            OrchestratorConfig::default(),
        );

        let request = RegenerationRequest {
            query: Query::new("Regenerate with more detail on failover"),
            preset: RegenerationPreset::standard(),
            previous_response: previous_response(),
        };

        let result = orchestrator
            .regenerate(request, "session_does_not_exist_0123456789abcdef", Parameters::default(), Category::Aws)
            .await;

        assert!(result.response.is_none());
        assert!(result.error.is_some());
    }
}
