//! Wire contracts and HTTP clients for the three downstream workers:
//! retrieve, web-search, synthesize. The workers themselves are out of
//! scope; only their request/response shapes and a thin reqwest-backed
//! caller live here.

use crate::domain::{Chunk, SearchResponse, SynthesizedResponse, WebResult};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<HashMap<String, String>>,
    pub max_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_search: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSearchResponse {
    pub results: Vec<WebResult>,
    pub source: String,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkRef {
    pub text: String,
    pub doc_id: String,
    pub source_id: String,
}

impl From<&Chunk> for ChunkRef {
    fn from(chunk: &Chunk) -> Self {
        Self { text: chunk.text.clone(), doc_id: chunk.doc_id.clone(), source_id: chunk.source_id.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebResultRef {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

impl From<&WebResult> for WebResultRef {
    fn from(result: &WebResult) -> Self {
        Self { title: result.title.clone(), snippet: result.snippet.clone(), url: result.url.clone() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesizeRequest {
    pub query: String,
    pub chunks: Vec<ChunkRef>,
    pub web_results: Vec<WebResultRef>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub model: String,
    /// Set only for regeneration requests: the previous response
    /// text, passed through so the synthesis worker can contrast against it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<String>,
}

/// Retrieval-augmented search (Stage A).
#[async_trait]
pub trait RetrieveWorker: Send + Sync {
    async fn search(&self, request: RetrieveRequest, budget: Duration) -> CoreResult<SearchResponse>;
}

/// Freshness-sensitive web search (Stage B).
#[async_trait]
pub trait WebSearchWorker: Send + Sync {
    async fn search(&self, request: WebSearchRequest, budget: Duration) -> CoreResult<WebSearchResponse>;
}

/// Context-grounded answer synthesis (Stage C).
#[async_trait]
pub trait SynthesisWorker: Send + Sync {
    async fn synthesize(&self, request: SynthesizeRequest, budget: Duration) -> CoreResult<SynthesizedResponse>;
}

/// Retry policy shared by all three worker calls: a fixed attempt
/// budget with exponential backoff between attempts. The final attempt's
/// error is what the orchestrator sees.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 2, base_backoff: Duration::from_millis(200) }
    }
}

pub async fn with_retry<T, Fut>(
    policy: RetryPolicy,
    mut call: impl FnMut() -> Fut,
) -> CoreResult<T>
where
    Fut: Future<Output = CoreResult<T>>,
{
    let mut last_err = None;
    for attempt in 0..policy.attempts.max(1) {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "worker call attempt failed");
                last_err = Some(err);
                if attempt + 1 < policy.attempts {
                    tokio::time::sleep(policy.base_backoff * 2u32.pow(attempt)).await;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| CoreError::Other("retry loop produced no result".to_string())))
}

async fn timed<T>(budget: Duration, fut: impl Future<Output = CoreResult<T>>, worker: &str) -> CoreResult<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::WorkerTimeout { worker: worker.to_string(), elapsed_ms: budget.as_millis() as u64 }),
    }
}

/// HTTP-backed retrieve worker.
pub struct HttpRetrieveWorker {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpRetrieveWorker {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into(), retry: RetryPolicy::default() }
    }
}

#[async_trait]
impl RetrieveWorker for HttpRetrieveWorker {
    async fn search(&self, request: RetrieveRequest, budget: Duration) -> CoreResult<SearchResponse> {
        timed(
            budget,
            with_retry(self.retry, || async {
                let response = self
                    .client
                    .post(&self.url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| CoreError::WorkerFailure { worker: "retrieve".to_string(), reason: e.to_string() })?;
                if !response.status().is_success() {
                    return Err(CoreError::WorkerFailure {
                        worker: "retrieve".to_string(),
                        reason: format!("status {}", response.status()),
                    });
                }
                response
                    .json::<SearchResponse>()
                    .await
                    .map_err(|e| CoreError::WorkerFailure { worker: "retrieve".to_string(), reason: e.to_string() })
            }),
            "retrieve",
        )
        .await
    }
}

/// HTTP-backed web-search worker.
pub struct HttpWebSearchWorker {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpWebSearchWorker {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into(), retry: RetryPolicy::default() }
    }
}

#[async_trait]
impl WebSearchWorker for HttpWebSearchWorker {
    async fn search(&self, request: WebSearchRequest, budget: Duration) -> CoreResult<WebSearchResponse> {
        timed(
            budget,
            with_retry(self.retry, || async {
                let response = self
                    .client
                    .post(&self.url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| CoreError::WorkerFailure { worker: "websearch".to_string(), reason: e.to_string() })?;
                if !response.status().is_success() {
                    return Err(CoreError::WorkerFailure {
                        worker: "websearch".to_string(),
                        reason: format!("status {}", response.status()),
                    });
                }
                response
                    .json::<WebSearchResponse>()
                    .await
                    .map_err(|e| CoreError::WorkerFailure { worker: "websearch".to_string(), reason: e.to_string() })
            }),
            "websearch",
        )
        .await
    }
}

/// HTTP-backed synthesis worker.
pub struct HttpSynthesisWorker {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl HttpSynthesisWorker {
    pub fn new(url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), url: url.into(), retry: RetryPolicy::default() }
    }
}

#[async_trait]
impl SynthesisWorker for HttpSynthesisWorker {
    async fn synthesize(&self, request: SynthesizeRequest, budget: Duration) -> CoreResult<SynthesizedResponse> {
        timed(
            budget,
            with_retry(self.retry, || async {
                let response = self
                    .client
                    .post(&self.url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|e| CoreError::WorkerFailure { worker: "synthesize".to_string(), reason: e.to_string() })?;
                if !response.status().is_success() {
                    return Err(CoreError::WorkerFailure {
                        worker: "synthesize".to_string(),
                        reason: format!("status {}", response.status()),
                    });
                }
                response
                    .json::<SynthesizedResponse>()
                    .await
                    .map_err(|e| CoreError::WorkerFailure { worker: "synthesize".to_string(), reason: e.to_string() })
            }),
            "synthesize",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn with_retry_succeeds_after_one_transient_failure() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy { attempts: 2, base_backoff: Duration::from_millis(1) };
        let result: CoreResult<u32> = with_retry(policy, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(CoreError::WorkerFailure { worker: "retrieve".to_string(), reason: "transient".to_string() })
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn with_retry_exhausts_budget_and_surfaces_last_error() {
        let policy = RetryPolicy { attempts: 2, base_backoff: Duration::from_millis(1) };
        let result: CoreResult<u32> = with_retry(policy, || async {
            Err(CoreError::WorkerFailure { worker: "retrieve".to_string(), reason: "down".to_string() })
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn timed_call_becomes_worker_timeout_on_expiry() {
        let result: CoreResult<u32> = timed(
            Duration::from_millis(5),
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            },
            "synthesize",
        )
        .await;
        assert!(matches!(result, Err(CoreError::WorkerTimeout { .. })));
    }
}
