use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rb_core::{
    retained_chat_messages, ChatMessage, Error, Paper, Result, SearchSession, SessionFilter, SessionStore,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;

use crate::{StorageBackend, StorageConfig};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL,
        paper_id TEXT NOT NULL,
        data TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_chat_paper ON chat_messages (user_id, paper_id, id)",
];

fn storage_error(context: &str, e: sqlx::Error) -> Error {
    Error::Storage(format!("{}: {}", context, e))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct SQLiteStorage {
    pool: SqlitePool,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    async fn open(config: &StorageConfig) -> Result<Self> {
        Self::new_with_path(&config.database_path).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| storage_error("Failed to connect to database", e))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| storage_error(&format!("Failed to run migration {}", i), e))?;
        }

        tracing::info!("SQLite session store ready at {}", db_path.display());
        Ok(Self { pool })
    }

    fn decode_session(row: &sqlx::sqlite::SqliteRow) -> Result<SearchSession> {
        let data: String = row.get("data");
        Ok(serde_json::from_str(&data)?)
    }
}

#[async_trait]
impl SessionStore for SQLiteStorage {
    async fn create_session(&self, session: &SearchSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, status, created_at, data) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.session_id)
        .bind(&session.user_id)
        .bind(session.status.as_str())
        .bind(timestamp(session.created_at))
        .bind(serde_json::to_string(session)?)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to create session", e))?;
        Ok(())
    }

    async fn get_session(&self, user_id: &str, session_id: &str) -> Result<Option<SearchSession>> {
        let row = sqlx::query("SELECT data FROM sessions WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to load session", e))?;
        row.as_ref().map(Self::decode_session).transpose()
    }

    async fn update_session(&self, session: &SearchSession) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET status = ?, data = ? WHERE session_id = ?")
            .bind(session.status.as_str())
            .bind(serde_json::to_string(session)?)
            .bind(&session.session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to update session", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Session {} not found", session.session_id)));
        }
        Ok(())
    }

    async fn list_sessions(&self, user_id: &str, filter: SessionFilter) -> Result<Vec<SearchSession>> {
        let rows = match filter.status {
            Some(status) => sqlx::query(
                "SELECT data FROM sessions WHERE user_id = ? AND status = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(status.as_str())
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await,
            None => sqlx::query(
                "SELECT data FROM sessions WHERE user_id = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(filter.limit as i64)
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|e| storage_error("Failed to list sessions", e))?;

        rows.iter().map(Self::decode_session).collect()
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE session_id = ? AND user_id = ?")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to delete session", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let result = sqlx::query(
            "DELETE FROM sessions WHERE status IN ('completed', 'failed') AND created_at < ?",
        )
        .bind(timestamp(cutoff))
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to purge sessions", e))?;
        Ok(result.rows_affected() as usize)
    }

    async fn find_paper(&self, user_id: &str, paper_id: &str) -> Result<Option<Paper>> {
        let rows = sqlx::query(
            "SELECT data FROM sessions WHERE user_id = ? AND status = 'completed' ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to search papers", e))?;

        for row in &rows {
            let session = Self::decode_session(row)?;
            if let Some(found) = session.papers.into_iter().find(|p| p.paper.id == paper_id) {
                return Ok(Some(found.paper));
            }
        }
        Ok(None)
    }

    async fn append_chat(&self, user_id: &str, paper_id: &str, messages: &[ChatMessage], keep: usize) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to open transaction", e))?;

        for message in messages {
            sqlx::query("INSERT INTO chat_messages (user_id, paper_id, data) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(paper_id)
                .bind(serde_json::to_string(message)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to store chat message", e))?;
        }

        sqlx::query(
            r#"
            DELETE FROM chat_messages
            WHERE user_id = ? AND paper_id = ? AND id NOT IN (
                SELECT id FROM chat_messages
                WHERE user_id = ? AND paper_id = ?
                ORDER BY id DESC LIMIT ?
            )
            "#,
        )
        .bind(user_id)
        .bind(paper_id)
        .bind(user_id)
        .bind(paper_id)
        .bind(retained_chat_messages(keep) as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error("Failed to trim chat history", e))?;

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit chat messages", e))
    }

    async fn chat_history(&self, user_id: &str, paper_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            "SELECT data FROM chat_messages WHERE user_id = ? AND paper_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .bind(paper_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to load chat history", e))?;

        rows.iter()
            .map(|row| {
                let data: String = row.get("data");
                Ok(serde_json::from_str(&data)?)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rb_core::{PaperSource, SearchRequest, SearchStatus};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sqlite_session_round_trip() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("sessions.db");
        let storage = SQLiteStorage::new_with_path(&db_path).await.unwrap();

        let mut session = SearchSession::new(
            "alice",
            &SearchRequest::new("protein folding", vec![PaperSource::Pubmed], 5),
        );
        storage.create_session(&session).await.unwrap();
        session.start().unwrap();
        storage.update_session(&session).await.unwrap();

        let loaded = storage.get_session("alice", &session.session_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SearchStatus::Running);

        assert!(storage.delete_session("alice", &session.session_id).await.unwrap());
        assert!(matches!(
            storage.update_session(&session).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_chat_history_order_and_trim() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("chat.db")).await.unwrap();

        for i in 0..3 {
            let pair = [
                ChatMessage::user(format!("q{}", i)),
                ChatMessage::assistant(format!("a{}", i)),
            ];
            storage.append_chat("alice", "paper", &pair, 4).await.unwrap();
        }

        let history = storage.chat_history("alice", "paper").await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);

        let pair = [ChatMessage::user("q3"), ChatMessage::assistant("a3")];
        storage.append_chat("alice", "paper", &pair, 3).await.unwrap();
        let history = storage.chat_history("alice", "paper").await.unwrap();
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["q3", "a3"]);
    }
}
