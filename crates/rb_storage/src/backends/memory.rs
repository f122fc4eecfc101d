use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rb_core::{
    retained_chat_messages, ChatMessage, Error, Paper, Result, SearchSession, SessionFilter, SessionStore,
};
use tokio::sync::RwLock;

use crate::{StorageBackend, StorageConfig};

#[derive(Default)]
pub struct MemoryStore {
    sessions: HashMap<String, SearchSession>,
    chats: HashMap<(String, String), Vec<ChatMessage>>,
}

impl MemoryStore {
    fn owned_session(&self, user_id: &str, session_id: &str) -> Option<&SearchSession> {
        self.sessions
            .get(session_id)
            .filter(|session| session.user_id == user_id)
    }
}

/// Process-local session store. Everything is lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    async fn open(_config: &StorageConfig) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl SessionStore for InMemoryStorage {
    async fn create_session(&self, session: &SearchSession) -> Result<()> {
        let mut store = self.store.write().await;
        if store.sessions.contains_key(&session.session_id) {
            return Err(Error::Storage(format!(
                "Session {} already exists",
                session.session_id
            )));
        }
        store
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<SearchSession>> {
        let store = self.store.read().await;
        Ok(store.owned_session(user_id, session_id).cloned())
    }

    async fn update_session(&self, session: &SearchSession) -> Result<()> {
        let mut store = self.store.write().await;
        match store.sessions.get_mut(&session.session_id) {
            Some(existing) => {
                *existing = session.clone();
                Ok(())
            }
            None => Err(Error::NotFound(format!(
                "Session {} not found",
                session.session_id
            ))),
        }
    }

    async fn list_sessions(&self, user_id: &str, filter: SessionFilter) -> Result<Vec<SearchSession>> {
        let store = self.store.read().await;
        let mut sessions: Vec<SearchSession> = store
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .filter(|s| filter.status.map_or(true, |status| s.status == status))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions.truncate(filter.limit);
        Ok(sessions)
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool> {
        let mut store = self.store.write().await;
        if store.owned_session(user_id, session_id).is_none() {
            return Ok(false);
        }
        Ok(store.sessions.remove(session_id).is_some())
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut store = self.store.write().await;
        let before = store.sessions.len();
        store
            .sessions
            .retain(|_, s| !(s.status.is_terminal() && s.created_at < cutoff));
        Ok(before - store.sessions.len())
    }

    async fn find_paper(&self, user_id: &str, paper_id: &str) -> Result<Option<Paper>> {
        let store = self.store.read().await;
        Ok(store
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .flat_map(|s| s.papers.iter())
            .find(|p| p.paper.id == paper_id)
            .map(|p| p.paper.clone()))
    }

    async fn append_chat(&self, user_id: &str, paper_id: &str, messages: &[ChatMessage], keep: usize) -> Result<()> {
        let mut store = self.store.write().await;
        let history = store
            .chats
            .entry((user_id.to_string(), paper_id.to_string()))
            .or_default();
        history.extend_from_slice(messages);
        let keep = retained_chat_messages(keep);
        if history.len() > keep {
            let excess = history.len() - keep;
            history.drain(..excess);
        }
        Ok(())
    }

    async fn chat_history(&self, user_id: &str, paper_id: &str) -> Result<Vec<ChatMessage>> {
        let store = self.store.read().await;
        Ok(store
            .chats
            .get(&(user_id.to_string(), paper_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
