//! Query orchestration core for a cloud-architecture question-answering
//! assistant.
//!
//! A query travels through six subsystems, in order:
//!
//! 1. [`classifier`] — admission: is this in-scope for cloud architecture?
//! 2. [`clarification`] — is the query under-specified enough to ask back?
//! 3. [`session`] — conversation history, read and appended around a call.
//! 4. [`retrieval`] — fallback-to-web-search decisions over retrieved chunks.
//! 5. [`orchestrator`] — the staged pipeline itself: retrieve, web search,
//!    synthesize, each under its own slice of an end-to-end deadline, with
//!    degraded responses when a stage fails or time runs out.
//! 6. [`feedback`] — a background actor that retunes [`domain::Parameters`]
//!    from accumulated verdicts.
//!
//! [`config`] loads the layered runtime configuration; [`logging`] wires up
//! structured tracing and request/error telemetry; [`sanitize`] redacts
//! secrets before anything is logged or persisted; [`webhook`] validates
//! inbound webhook signatures; [`error`] is the crate-wide error type.

pub mod classifier;
pub mod clarification;
pub mod config;
pub mod domain;
pub mod error;
pub mod feedback;
pub mod logging;
pub mod orchestrator;
pub mod retrieval;
pub mod sanitize;
pub mod session;
pub mod webhook;

pub use domain::{Category, ClassificationResult, OrchestrationResult, Parameters, Query};
pub use error::{CoreError, CoreResult};
pub use orchestrator::{Orchestrator, OrchestratorConfig};

/// Current version of the query orchestration core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
