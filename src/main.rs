//! Command-line entry point for the query orchestration core.
//!
//! Wires configuration and logging, then either starts the long-running
//! adaptive controller alongside HTTP-backed workers, or — under
//! `--demo` — runs one query through the full pipeline against stub
//! workers so the wiring can be exercised without live downstream
//! services.

use async_trait::async_trait;
use clap::Parser;
use cloud_query_orchestrator::config::Config;
use cloud_query_orchestrator::domain::{Chunk, Parameters, Query, SearchResponse, Source, SynthesisMetadata, SynthesizedResponse};
use cloud_query_orchestrator::error::CoreResult;
use cloud_query_orchestrator::feedback::controller::AdaptiveController;
use cloud_query_orchestrator::feedback::InMemoryFeedbackStore;
use cloud_query_orchestrator::logging::{self, LoggingConfig};
use cloud_query_orchestrator::orchestrator::workers::{
    HttpRetrieveWorker, HttpSynthesisWorker, HttpWebSearchWorker, RetrieveRequest, RetrieveWorker, SynthesizeRequest, SynthesisWorker,
    WebSearchRequest, WebSearchResponse, WebSearchWorker,
};
use cloud_query_orchestrator::orchestrator::{Orchestrator, OrchestratorConfig};
use cloud_query_orchestrator::retrieval::RetrievalConfig;
use cloud_query_orchestrator::session::memory::InMemorySessionStore;
use cloud_query_orchestrator::session::SessionStore;
use cloud_query_orchestrator::{classifier, clarification};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cloud-query-orchestrator", about = "Cloud-architecture RAG query orchestration core")]
struct Cli {
    /// Path to a YAML configuration file; falls back to defaults and
    /// CQO_-prefixed environment variables when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Run one query through the pipeline against stub workers and print
    /// the result, instead of starting a long-running process.
    #[arg(long)]
    demo: bool,

    /// Query text used by --demo.
    #[arg(long, default_value = "How do I set up a VPC with public and private subnets on AWS?")]
    query: String,
}

#[tokio::main]
async fn main() -> CoreResult<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    logging::init_tracing(&LoggingConfig::default());

    println!("cloud-query-orchestrator");
    println!("=========================");
    println!("model: {}  retrieval.max_chunks: {}", config.synthesis.model, config.retrieval.max_chunks);

    if cli.demo {
        run_demo(&cli.query).await?;
        return Ok(());
    }

    let orchestrator_config = OrchestratorConfig {
        model: config.synthesis.model.clone(),
        max_tokens: config.synthesis.max_tokens,
        base_temperature: config.synthesis.temperature,
        max_web_results: config.websearch.max_results,
        freshness_keywords: config.websearch.freshness_keywords.clone(),
        ..OrchestratorConfig::default()
    };
    let retrieval_config = RetrievalConfig {
        max_chunks: config.retrieval.max_chunks,
        fallback_threshold_count: config.retrieval.fallback_threshold,
        confidence_threshold: config.retrieval.confidence_threshold,
        fallback_score_threshold: config.retrieval.fallback_score_threshold,
    };

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(
        chrono::Duration::minutes(config.session.default_ttl_minutes),
        config.session.max_sessions,
    ));
    let feedback_store = Arc::new(InMemoryFeedbackStore::new());
    let controller = AdaptiveController::spawn(feedback_store, config.learning.lookback_days, config.learning.analysis_interval_duration());

    let orchestrator = Orchestrator::new(
        Arc::new(HttpRetrieveWorker::new(config.services.retrieve_url.clone())),
        Arc::new(HttpWebSearchWorker::new(config.services.websearch_url.clone())),
        Arc::new(HttpSynthesisWorker::new(config.services.synthesize_url.clone())),
        sessions,
        retrieval_config,
        orchestrator_config,
    );

    println!("ready; current parameters: {:?}", controller.current());
    let _ = orchestrator;
    Ok(())
}

async fn run_demo(query_text: &str) -> CoreResult<()> {
    let query = Query::new(query_text);
    let classification = classifier::classify(&query);
    println!("classification: {:?} (confidence {:.2})", classification.category, classification.confidence);

    if !classification.in_scope {
        println!("rejected: {}", classifier::REJECTION_MESSAGE);
        return Ok(());
    }

    let clarify = clarification::analyze(&query.text, &[]);
    if clarify.requires_clarification {
        println!("needs clarification: {:?}", clarify.questions);
        return Ok(());
    }

    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(chrono::Duration::minutes(30), 1_000));
    let session = sessions.create("demo-user").await?;

    let orchestrator = Orchestrator::new(
        Arc::new(StubRetrieveWorker),
        Arc::new(StubWebSearchWorker),
        Arc::new(StubSynthesisWorker),
        sessions,
        RetrievalConfig::default(),
        OrchestratorConfig::default(),
    );

    let result = orchestrator.orchestrate(query, &session.id, Parameters::default(), classification.category).await;
    match result.response {
        Some(response) => println!("response: {}", response.main_text),
        None => println!("orchestration failed: {}", result.error.unwrap_or_default()),
    }
    Ok(())
}

struct StubRetrieveWorker;

#[async_trait]
impl RetrieveWorker for StubRetrieveWorker {
    async fn search(&self, request: RetrieveRequest, _budget: Duration) -> CoreResult<SearchResponse> {
        let chunks = vec![Chunk {
            text: format!("A reference architecture for: {}", request.query),
            score: 0.92,
            doc_id: "doc_demo".to_string(),
            source_id: "doc_demo_chunk_0".to_string(),
            metadata: HashMap::new(),
        }];
        Ok(SearchResponse { count: chunks.len(), query: request.query, fallback_triggered: false, fallback_reason: None, chunks })
    }
}

struct StubWebSearchWorker;

#[async_trait]
impl WebSearchWorker for StubWebSearchWorker {
    async fn search(&self, _request: WebSearchRequest, _budget: Duration) -> CoreResult<WebSearchResponse> {
        Ok(WebSearchResponse { results: Vec::new(), source: "stub".to_string(), cached: false })
    }
}

struct StubSynthesisWorker;

#[async_trait]
impl SynthesisWorker for StubSynthesisWorker {
    async fn synthesize(&self, request: SynthesizeRequest, _budget: Duration) -> CoreResult<SynthesizedResponse> {
        Ok(SynthesizedResponse {
            main_text: format!("Demo answer for \"{}\" grounded in {} chunk(s).", request.query, request.chunks.len()),
            diagram_code: None,
            sources: request.chunks.iter().map(|c| Source::Chunk(Chunk {
                text: c.text.clone(),
                score: 0.9,
                doc_id: c.doc_id.clone(),
                source_id: c.source_id.clone(),
                metadata: HashMap::new(),
            })).collect(),
            metadata: SynthesisMetadata {
                model: request.model,
                input_tokens: 128,
                output_tokens: 64,
                temperature: request.temperature,
                pipeline_decision: "stub".to_string(),
                processing_stats: HashMap::new(),
            },
        })
    }
}
