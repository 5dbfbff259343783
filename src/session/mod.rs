//! Session / conversation store.
//!
//! Defines the `Session`/`Message` data model, id validation, and the
//! `SessionStore` capability trait. Two backends implement the trait:
//! [`memory::InMemorySessionStore`] (single-node default) and
//! [`remote::RemoteSessionStore`] (pluggable remote key-value backend).

pub mod memory;
pub mod remote;

use crate::error::{CoreError, CoreResult};
use crate::sanitize::derive_title;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use uuid::Uuid;

fn session_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^session_[0-9a-f]{16,}$").unwrap())
}

fn message_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^msg_[0-9a-f]{8,}$").unwrap())
}

/// Validate a session id against `session_[0-9a-f]{>=16}`.
pub fn validate_session_id(id: &str) -> CoreResult<()> {
    if session_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(CoreError::ValidationError(format!("malformed session id: {id}")))
    }
}

/// Validate a message id against `msg_[0-9a-f]{>=8}`.
pub fn validate_message_id(id: &str) -> CoreResult<()> {
    if message_id_pattern().is_match(id) {
        Ok(())
    } else {
        Err(CoreError::ValidationError(format!("malformed message id: {id}")))
    }
}

fn new_session_id() -> String {
    format!("session_{}", Uuid::new_v4().simple())
}

fn new_message_id() -> String {
    // uuid simple-form hex is 32 chars, comfortably over the 8-char floor.
    format!("msg_{}", &Uuid::new_v4().simple().to_string()[..12])
}

/// Conversational role of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single turn in a conversation. Append-only once written to a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: u32,
    pub metadata: HashMap<String, String>,
}

impl Message {
    pub fn new(role: Role, content: String) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.clone(),
            timestamp: Utc::now(),
            token_count: approximate_token_count(&content),
            metadata: HashMap::new(),
        }
    }

    pub fn new_user(content: String) -> Self {
        Self::new(Role::User, content)
    }

    pub fn new_assistant(content: String) -> Self {
        Self::new(Role::Assistant, content)
    }
}

fn approximate_token_count(content: &str) -> u32 {
    content.split_whitespace().count() as u32
}

/// A multi-turn conversation owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    pub metadata: HashMap<String, String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, ttl: chrono::Duration) -> Self {
        let now = Utc::now();
        Self {
            id: new_session_id(),
            user_id: user_id.into(),
            title: String::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
            messages: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// A session is live iff `expires_at > now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Append a message, refreshing the title from the first user message
    /// and bumping `updated_at`/`expires_at` (every write refreshes TTL).
    pub fn append(&mut self, message: Message, ttl: chrono::Duration) {
        if self.messages.is_empty() && message.role == Role::User && self.title.is_empty() {
            self.title = derive_title(&message.content);
        }
        self.messages.push(message);
        let now = Utc::now();
        self.updated_at = now;
        self.expires_at = now + ttl;
    }
}

/// One page of a user's session list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPage {
    pub sessions: Vec<Session>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

/// Aggregate operational counters across all live sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStoreStats {
    pub active_sessions: usize,
    pub total_messages: usize,
}

/// Capability set a session backend must provide. The
/// orchestrator depends only on this trait, never on a concrete backend.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, user_id: &str) -> CoreResult<Session>;
    async fn get(&self, id: &str) -> CoreResult<Session>;
    async fn exists(&self, id: &str) -> CoreResult<bool>;
    async fn append_message(&self, id: &str, message: Message) -> CoreResult<Session>;
    async fn update_title(&self, id: &str, title: &str) -> CoreResult<()>;
    async fn update_expiry(&self, id: &str, new_expiry: DateTime<Utc>) -> CoreResult<()>;
    async fn delete(&self, id: &str) -> CoreResult<()>;
    async fn list(&self, user_id: &str, page: usize, page_size: usize) -> CoreResult<SessionPage>;
    async fn cleanup(&self) -> CoreResult<usize>;
    /// Aggregate counters across all live sessions (active session count,
    /// total message count), for operational introspection.
    async fn stats(&self) -> CoreResult<SessionStoreStats>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_validation_accepts_well_formed_ids() {
        assert!(validate_session_id("session_0123456789abcdef").is_ok());
        assert!(validate_session_id("session_0123456789abcdef0123").is_ok());
    }

    #[test]
    fn session_id_validation_rejects_other_shapes() {
        assert!(validate_session_id("session_short").is_err());
        assert!(validate_session_id("sess_0123456789abcdef").is_err());
        assert!(validate_session_id("session_0123456789ABCDEF").is_err());
    }

    #[test]
    fn message_id_validation() {
        assert!(validate_message_id("msg_deadbeef").is_ok());
        assert!(validate_message_id("msg_dead").is_err());
    }

    #[test]
    fn title_is_set_from_first_user_message_only() {
        let mut session = Session::new("u1", chrono::Duration::minutes(30));
        session.append(
            Message::new_user("Help me design a migration plan for our on-prem SQL Server".to_string()),
            chrono::Duration::minutes(30),
        );
        let first_title = session.title.clone();
        assert!(!first_title.is_empty());

        session.append(Message::new_assistant("Sure, let's start with...".to_string()), chrono::Duration::minutes(30));
        assert_eq!(session.title, first_title);
    }
}
