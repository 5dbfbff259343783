//! In-memory session backend: a TTL-indexed map guarded by per-session
//! locks, suitable for single-node deployments.
//!
//! A coarse `RwLock` over the directory structure (insert/remove/iterate)
//! plus a per-entry `tokio::sync::Mutex` so that writes to one session
//! never block writes to another — the directory lock is only ever held
//! for map bookkeeping, not across a session mutation.

use super::{Message, Session, SessionPage, SessionStore, SessionStoreStats};
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

struct Entry {
    session: Mutex<Session>,
}

/// In-memory backend with TTL refresh-on-write and oldest-`updated_at`
/// eviction once `max_sessions` is exceeded.
pub struct InMemorySessionStore {
    directory: RwLock<HashMap<String, Arc<Entry>>>,
    user_index: RwLock<HashMap<String, Vec<String>>>,
    default_ttl: Duration,
    max_sessions: usize,
}

impl InMemorySessionStore {
    pub fn new(default_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            directory: RwLock::new(HashMap::new()),
            user_index: RwLock::new(HashMap::new()),
            default_ttl,
            max_sessions,
        }
    }

    async fn entry(&self, id: &str) -> CoreResult<Arc<Entry>> {
        let directory = self.directory.read().await;
        directory
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::SessionNotFound(id.to_string()))
    }

    /// Evict the session with the oldest `updated_at` if `max_sessions` is
    /// exceeded. Called while holding the directory write lock's caller
    /// context (insertion path) so the live-count check is consistent.
    async fn evict_if_over_capacity(&self) {
        let mut directory = self.directory.write().await;
        if directory.len() <= self.max_sessions {
            return;
        }
        let mut oldest: Option<(String, DateTime<Utc>)> = None;
        for (id, entry) in directory.iter() {
            let updated_at = entry.session.lock().await.updated_at;
            if oldest.as_ref().map(|(_, t)| updated_at < *t).unwrap_or(true) {
                oldest = Some((id.clone(), updated_at));
            }
        }
        if let Some((victim_id, _)) = oldest {
            directory.remove(&victim_id);
            drop(directory);
            let mut index = self.user_index.write().await;
            for ids in index.values_mut() {
                ids.retain(|id| id != &victim_id);
            }
        }
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let expired_ids: Vec<String> = {
            let directory = self.directory.read().await;
            let mut ids = Vec::new();
            for (id, entry) in directory.iter() {
                if entry.session.lock().await.expires_at <= now {
                    ids.push(id.clone());
                }
            }
            ids
        };
        if expired_ids.is_empty() {
            return 0;
        }
        let mut directory = self.directory.write().await;
        for id in &expired_ids {
            directory.remove(id);
        }
        drop(directory);
        let mut index = self.user_index.write().await;
        for ids in index.values_mut() {
            ids.retain(|id| !expired_ids.contains(id));
        }
        expired_ids.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, user_id: &str) -> CoreResult<Session> {
        let session = Session::new(user_id, self.default_ttl);
        {
            let mut directory = self.directory.write().await;
            directory.insert(
                session.id.clone(),
                Arc::new(Entry {
                    session: Mutex::new(session.clone()),
                }),
            );
        }
        {
            let mut index = self.user_index.write().await;
            index.entry(user_id.to_string()).or_default().push(session.id.clone());
        }
        self.evict_if_over_capacity().await;
        Ok(session)
    }

    async fn get(&self, id: &str) -> CoreResult<Session> {
        let entry = self.entry(id).await?;
        let session = entry.session.lock().await;
        if !session.is_live(Utc::now()) {
            return Err(CoreError::SessionNotFound(id.to_string()));
        }
        Ok(session.clone())
    }

    async fn exists(&self, id: &str) -> CoreResult<bool> {
        match self.get(id).await {
            Ok(_) => Ok(true),
            Err(CoreError::SessionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn append_message(&self, id: &str, message: Message) -> CoreResult<Session> {
        let entry = self.entry(id).await?;
        let mut session = entry.session.lock().await;
        if !session.is_live(Utc::now()) {
            return Err(CoreError::SessionNotFound(id.to_string()));
        }
        session.append(message, self.default_ttl);
        Ok(session.clone())
    }

    async fn update_title(&self, id: &str, title: &str) -> CoreResult<()> {
        let entry = self.entry(id).await?;
        let mut session = entry.session.lock().await;
        session.title = title.to_string();
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn update_expiry(&self, id: &str, new_expiry: DateTime<Utc>) -> CoreResult<()> {
        let entry = self.entry(id).await?;
        let mut session = entry.session.lock().await;
        session.expires_at = new_expiry;
        Ok(())
    }

    async fn delete(&self, id: &str) -> CoreResult<()> {
        let session = {
            let mut directory = self.directory.write().await;
            directory.remove(id)
        };
        if let Some(entry) = session {
            let user_id = entry.session.lock().await.user_id.clone();
            let mut index = self.user_index.write().await;
            if let Some(ids) = index.get_mut(&user_id) {
                ids.retain(|sid| sid != id);
            }
            Ok(())
        } else {
            Err(CoreError::SessionNotFound(id.to_string()))
        }
    }

    async fn list(&self, user_id: &str, page: usize, page_size: usize) -> CoreResult<SessionPage> {
        let ids = {
            let index = self.user_index.read().await;
            index.get(user_id).cloned().unwrap_or_default()
        };
        let now = Utc::now();
        let mut live_sessions = Vec::new();
        let directory = self.directory.read().await;
        for id in &ids {
            if let Some(entry) = directory.get(id) {
                let session = entry.session.lock().await;
                if session.is_live(now) {
                    live_sessions.push(session.clone());
                }
            }
        }
        live_sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let total = live_sessions.len();
        let start = page.saturating_mul(page_size).min(total);
        let end = (start + page_size).min(total);
        Ok(SessionPage {
            sessions: live_sessions[start..end].to_vec(),
            page,
            page_size,
            total,
        })
    }

    async fn cleanup(&self) -> CoreResult<usize> {
        Ok(self.remove_expired(Utc::now()).await)
    }

    async fn stats(&self) -> CoreResult<SessionStoreStats> {
        let now = Utc::now();
        let directory = self.directory.read().await;
        let mut active_sessions = 0;
        let mut total_messages = 0;
        for entry in directory.values() {
            let session = entry.session.lock().await;
            if session.is_live(now) {
                active_sessions += 1;
                total_messages += session.messages.len();
            }
        }
        Ok(SessionStoreStats { active_sessions, total_messages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemorySessionStore::new(Duration::minutes(30), 1000);
        let session = store.create("user-1").await.unwrap();
        let fetched = store.get(&session.id).await.unwrap();
        assert_eq!(session.id, fetched.id);
    }

    #[tokio::test]
    async fn append_message_refreshes_ttl_and_is_visible_immediately() {
        let store = InMemorySessionStore::new(Duration::minutes(30), 1000);
        let session = store.create("user-1").await.unwrap();
        let before = store.get(&session.id).await.unwrap().expires_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .append_message(&session.id, Message::new_user("hi".into()))
            .await
            .unwrap();

        let after = store.get(&session.id).await.unwrap();
        assert_eq!(after.messages.len(), 1);
        assert!(after.expires_at >= before);
    }

    #[tokio::test]
    async fn expired_session_is_invisible_before_cleanup_runs() {
        let store = InMemorySessionStore::new(Duration::milliseconds(5), 1000);
        let session = store.create("user-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(matches!(store.get(&session.id).await, Err(CoreError::SessionNotFound(_))));
        // cleanup() then physically removes it; list() already hid it.
        let removed = store.cleanup().await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn eviction_removes_oldest_updated_session_over_capacity() {
        let store = InMemorySessionStore::new(Duration::minutes(30), 2);
        let first = store.create("user-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _second = store.create("user-1").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let _third = store.create("user-1").await.unwrap();

        assert!(matches!(store.get(&first.id).await, Err(CoreError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn list_reflects_mutation_within_the_same_logical_operation() {
        let store = InMemorySessionStore::new(Duration::minutes(30), 1000);
        let session = store.create("user-2").await.unwrap();
        store
            .append_message(&session.id, Message::new_user("hello".into()))
            .await
            .unwrap();

        let page = store.list("user-2", 0, 10).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.sessions[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn stats_counts_only_live_sessions_and_their_messages() {
        let long_lived = InMemorySessionStore::new(Duration::minutes(30), 1000);
        let session = long_lived.create("user-1").await.unwrap();
        long_lived.append_message(&session.id, Message::new_user("hi".into())).await.unwrap();
        long_lived.append_message(&session.id, Message::new_assistant("hello".into())).await.unwrap();

        let stats = long_lived.stats().await.unwrap();
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.total_messages, 2);
    }

    #[tokio::test]
    async fn stats_excludes_expired_sessions_even_before_cleanup_runs() {
        let store = InMemorySessionStore::new(Duration::milliseconds(10), 1000);
        store.create("user-2").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.total_messages, 0);
    }

    #[tokio::test]
    async fn concurrent_appends_to_distinct_sessions_lose_nothing() {
        let store = Arc::new(InMemorySessionStore::new(Duration::minutes(30), 1000));
        let a = store.create("user-a").await.unwrap();
        let b = store.create("user-b").await.unwrap();

        let store_a = store.clone();
        let id_a = a.id.clone();
        let task_a = tokio::spawn(async move {
            for i in 0..20 {
                store_a
                    .append_message(&id_a, Message::new_user(format!("a{i}")))
                    .await
                    .unwrap();
            }
        });

        let store_b = store.clone();
        let id_b = b.id.clone();
        let task_b = tokio::spawn(async move {
            for i in 0..20 {
                store_b
                    .append_message(&id_b, Message::new_user(format!("b{i}")))
                    .await
                    .unwrap();
            }
        });

        task_a.await.unwrap();
        task_b.await.unwrap();

        assert_eq!(store.get(&a.id).await.unwrap().messages.len(), 20);
        assert_eq!(store.get(&b.id).await.unwrap().messages.len(), 20);
    }
}
