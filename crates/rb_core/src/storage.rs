use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ChatMessage, Paper, SearchSession, SearchStatus};
use crate::Result;

/// Number of chat messages to retain for a history limit of `limit`:
/// whole user/assistant exchanges only, and never less than one.
pub fn retained_chat_messages(limit: usize) -> usize {
    limit.max(2) & !1
}

#[derive(Debug, Clone, Copy)]
pub struct SessionFilter {
    pub limit: usize,
    pub status: Option<SearchStatus>,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self { limit: 20, status: None }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a freshly created session
    async fn create_session(&self, session: &SearchSession) -> Result<()>;

    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<SearchSession>>;

    /// Overwrite an existing session. Fails with `NotFound` once the session is deleted.
    async fn update_session(&self, session: &SearchSession) -> Result<()>;

    /// Sessions of one user, newest first
    async fn list_sessions(&self, user_id: &str, filter: SessionFilter) -> Result<Vec<SearchSession>>;

    /// Returns false when nothing was deleted
    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool>;

    /// Remove terminal sessions created before `cutoff`
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Look a paper up among the results of the user's sessions
    async fn find_paper(&self, user_id: &str, paper_id: &str) -> Result<Option<Paper>>;

    /// Append messages to a paper's chat, keeping the newest exchanges that fit
    /// in `keep` messages (see [`retained_chat_messages`])
    async fn append_chat(&self, user_id: &str, paper_id: &str, messages: &[ChatMessage], keep: usize) -> Result<()>;

    async fn chat_history(&self, user_id: &str, paper_id: &str) -> Result<Vec<ChatMessage>>;
}
