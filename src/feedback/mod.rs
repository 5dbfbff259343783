//! Feedback analytics & adaptive parameter controller.
//!
//! `Feedback` records are owned by the (external) feedback persistence
//! backend; this crate only reads them through the [`FeedbackStore`] trait
//! and, on ingestion, sanitizes the `query` field before handing it to
//! that backend.

pub mod controller;
pub mod insights;

use crate::domain::Category;
use crate::error::CoreResult;
use crate::sanitize::sanitize_query;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome a user attached to a prior response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Positive,
    Negative,
    Neutral,
}

impl Verdict {
    /// Numeric weight used by the response-quality trend.
    pub fn weight(&self) -> f64 {
        match self {
            Verdict::Positive => 1.0,
            Verdict::Negative => -1.0,
            Verdict::Neutral => 0.0,
        }
    }
}

/// One feedback record. `category` is the classifier category of the
/// original query, recorded at ingestion time so the controller never needs to
/// reclassify history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: String,
    pub query: String,
    pub verdict: Verdict,
    pub category: Category,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: Option<u64>,
    pub sources_used: Vec<String>,
}

impl Feedback {
    /// Construct a feedback record, sanitizing `raw_query` before it is
    /// ever stored.
    pub fn new(raw_query: &str, verdict: Verdict, category: Category) -> Self {
        Self {
            id: format!("fb_{}", Uuid::new_v4().simple()),
            query: sanitize_query(raw_query),
            verdict,
            category,
            user_id: None,
            session_id: None,
            timestamp: Utc::now(),
            response_time_ms: None,
            sources_used: Vec::new(),
        }
    }
}

/// Capability set the (external) feedback persistence backend must
/// provide. The controller only ever reads through this trait; it never owns the
/// records.
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn append(&self, feedback: Feedback) -> CoreResult<()>;
    async fn load_since(&self, since: DateTime<Utc>) -> CoreResult<Vec<Feedback>>;
}

/// In-memory feedback store: append-mostly, guarded by a single lock so
/// concurrent appends never interleave partial records.
pub struct InMemoryFeedbackStore {
    records: tokio::sync::RwLock<Vec<Feedback>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self { records: tokio::sync::RwLock::new(Vec::new()) }
    }
}

impl Default for InMemoryFeedbackStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn append(&self, feedback: Feedback) -> CoreResult<()> {
        self.records.write().await.push(feedback);
        Ok(())
    }

    async fn load_since(&self, since: DateTime<Utc>) -> CoreResult<Vec<Feedback>> {
        Ok(self.records.read().await.iter().filter(|f| f.timestamp >= since).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feedback_construction_sanitizes_the_query() {
        let feedback = Feedback::new("Connect with password MySecretPass123", Verdict::Negative, Category::Security);
        assert_eq!(feedback.query, "Connect with [REDACTED]");
    }

    #[tokio::test]
    async fn store_round_trips_and_filters_by_timestamp() {
        let store = InMemoryFeedbackStore::new();
        let cutoff = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append(Feedback::new("a VPC question", Verdict::Positive, Category::Aws)).await.unwrap();

        let recent = store.load_since(cutoff).await.unwrap();
        assert_eq!(recent.len(), 1);

        let none = store.load_since(Utc::now() + chrono::Duration::seconds(5)).await.unwrap();
        assert!(none.is_empty());
    }
}
