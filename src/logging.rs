//! Logging and telemetry for the query orchestration core.
//!
//! Request/error/performance tracking with structured `tracing`
//! initialization. Every logged query string passes through
//! [`crate::sanitize::sanitize_query`] first, so secrets never reach
//! log output.

use crate::sanitize::sanitize_query;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_level: String,
    pub json_format: bool,
    pub max_retained_request_logs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_format: false, max_retained_request_logs: 10_000 }
    }
}

/// Initialize the global `tracing` subscriber. Safe to call more than
/// once per process (e.g. once per test binary) — a second attempt is
/// reported and ignored rather than panicking.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let result = if config.json_format {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer().json()).try_init()
    } else {
        tracing_subscriber::registry().with(env_filter).with(fmt::layer()).try_init()
    };

    if result.is_err() {
        eprintln!("tracing subscriber already initialized; keeping the existing one");
    }
}

/// One logged `/query` or `/feedback` request. `query` is always the
/// sanitized form — never the raw user text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequestLog {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub user_id: Option<String>,
    pub query: String,
    pub duration_ms: u64,
    pub fallback_used: bool,
    pub services_used: Vec<String>,
    pub error: Option<String>,
}

/// Severity of a logged error, orthogonal to [`crate::error::CoreError`]'s
/// kind — a `WorkerTimeout` recovered by degradation logs at `Warn`, an
/// `OrchestrationTimeout` surfaced to the caller logs at `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Warn,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLog {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: ErrorSeverity,
    pub kind: String,
    pub message: String,
}

/// Rolling usage counters, recomputed from retained request logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageAnalytics {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_fallbacks: u64,
    pub average_duration_ms: f64,
}

/// In-process request/error log buffer plus derived usage analytics.
/// Bounded: once `max_retained_request_logs` is exceeded the oldest half
/// is dropped.
pub struct LoggingManager {
    config: LoggingConfig,
    request_logs: Mutex<Vec<ApiRequestLog>>,
    error_logs: Mutex<Vec<ErrorLog>>,
    active_requests: Mutex<HashMap<String, Instant>>,
}

impl LoggingManager {
    pub fn new(config: LoggingConfig) -> Self {
        Self {
            config,
            request_logs: Mutex::new(Vec::new()),
            error_logs: Mutex::new(Vec::new()),
            active_requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_request(&self, request_id: &str) {
        self.active_requests.lock().unwrap().insert(request_id.to_string(), Instant::now());
        tracing::debug!(request_id, "request started");
    }

    /// Complete a request, sanitizing `raw_query` before it is logged or
    /// retained anywhere.
    pub fn complete_request(
        &self,
        request_id: &str,
        endpoint: &str,
        user_id: Option<String>,
        raw_query: &str,
        fallback_used: bool,
        services_used: Vec<String>,
        error: Option<String>,
    ) {
        let duration = self
            .active_requests
            .lock()
            .unwrap()
            .remove(request_id)
            .map(|start| start.elapsed())
            .unwrap_or(Duration::from_millis(0));

        let query = sanitize_query(raw_query);
        let entry = ApiRequestLog {
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            endpoint: endpoint.to_string(),
            user_id,
            query: query.clone(),
            duration_ms: duration.as_millis() as u64,
            fallback_used,
            services_used,
            error: error.clone(),
        };

        if let Some(ref e) = error {
            tracing::warn!(request_id, endpoint, query, duration_ms = entry.duration_ms, error = e, "request completed with an error");
        } else {
            tracing::info!(request_id, endpoint, query, duration_ms = entry.duration_ms, fallback_used, "request completed");
        }

        let mut logs = self.request_logs.lock().unwrap();
        logs.push(entry);
        if logs.len() > self.config.max_retained_request_logs {
            let drop_to = self.config.max_retained_request_logs / 2;
            logs.drain(0..logs.len() - drop_to);
        }
    }

    pub fn log_error(&self, request_id: &str, severity: ErrorSeverity, kind: &str, message: &str) {
        match severity {
            ErrorSeverity::Warn => tracing::warn!(request_id, kind, message),
            ErrorSeverity::Error | ErrorSeverity::Critical => tracing::error!(request_id, kind, message),
        }
        self.error_logs.lock().unwrap().push(ErrorLog {
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            severity,
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    pub fn usage_analytics(&self) -> UsageAnalytics {
        let logs = self.request_logs.lock().unwrap();
        if logs.is_empty() {
            return UsageAnalytics::default();
        }
        let total_requests = logs.len() as u64;
        let total_errors = logs.iter().filter(|l| l.error.is_some()).count() as u64;
        let total_fallbacks = logs.iter().filter(|l| l.fallback_used).count() as u64;
        let average_duration_ms = logs.iter().map(|l| l.duration_ms as f64).sum::<f64>() / logs.len() as f64;
        UsageAnalytics { total_requests, total_errors, total_fallbacks, average_duration_ms }
    }

    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorLog> {
        let logs = self.error_logs.lock().unwrap();
        logs.iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_request_sanitizes_the_logged_query() {
        let manager = LoggingManager::new(LoggingConfig::default());
        manager.start_request("req-1");
        manager.complete_request("req-1", "/query", None, "password=hunter2 design a VPC", false, vec!["retrieve".to_string()], None);

        let logs = manager.request_logs.lock().unwrap();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].query.contains("hunter2"));
    }

    #[test]
    fn usage_analytics_counts_errors_and_fallbacks() {
        let manager = LoggingManager::new(LoggingConfig::default());
        manager.start_request("req-1");
        manager.complete_request("req-1", "/query", None, "q1", true, vec![], Some("timeout".to_string()));
        manager.start_request("req-2");
        manager.complete_request("req-2", "/query", None, "q2", false, vec!["retrieve".to_string()], None);

        let analytics = manager.usage_analytics();
        assert_eq!(analytics.total_requests, 2);
        assert_eq!(analytics.total_errors, 1);
        assert_eq!(analytics.total_fallbacks, 1);
    }

    #[test]
    fn retention_drops_the_oldest_half_once_over_capacity() {
        let manager = LoggingManager::new(LoggingConfig { max_retained_request_logs: 4, ..Default::default() });
        for i in 0..6 {
            let id = format!("req-{i}");
            manager.start_request(&id);
            manager.complete_request(&id, "/query", None, "q", false, vec![], None);
        }
        let logs = manager.request_logs.lock().unwrap();
        assert!(logs.len() <= 4);
    }
}
