//! Error taxonomy for the query orchestration core.
//!
//! Mirrors the logical error kinds from the error handling design: most
//! worker-facing failures are recovered locally by the orchestrator's
//! degradation rules and never reach a caller as an `Err`. Only
//! [`CoreError::OrchestrationTimeout`], [`CoreError::SessionNotFound`] and
//! [`CoreError::ValidationError`] are meant to surface to callers.

use thiserror::Error;

/// Main error type for the orchestration core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The query was rejected by the admission classifier. Not retryable;
    /// the caller should show the user-visible rejection string.
    #[error("query rejected: {0}")]
    AdmissionRejected(String),

    /// A worker call did not complete before its child deadline fired.
    #[error("worker '{worker}' timed out after {elapsed_ms}ms")]
    WorkerTimeout { worker: String, elapsed_ms: u64 },

    /// A worker returned a non-2xx status or an unparseable body.
    #[error("worker '{worker}' failed: {reason}")]
    WorkerFailure { worker: String, reason: String },

    /// The end-to-end deadline fired before the orchestration could
    /// complete. Surfaces to the caller.
    #[error("orchestration exceeded the end-to-end deadline")]
    OrchestrationTimeout,

    /// No session exists with the given id, or it has expired.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Malformed request: bad id shape, missing required field, etc.
    /// Surfaces to the caller immediately.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Configuration is missing a required field and `TestMode` is not set.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Webhook signature validation failed.
    #[error("webhook validation failed: {0}")]
    WebhookValidation(String),

    /// Feedback store / session store backend failure.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Wraps an HTTP client failure talking to a downstream worker.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Wraps a JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Wraps an I/O failure (config file reads, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for conditions that don't fit another variant.
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// True for errors the orchestrator recovers from locally via
    /// degradation rules rather than surfacing to the caller.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::WorkerTimeout { .. } | CoreError::WorkerFailure { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
