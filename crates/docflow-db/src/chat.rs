//! Chat session and message repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use docflow_core::{
    new_v7, ChatMessage, ChatRepository, ChatSession, Citation, Error, MessageRole, Result,
};

/// PostgreSQL implementation of ChatRepository.
pub struct PgChatRepository {
    pool: Pool<Postgres>,
}

impl PgChatRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_message_row(row: sqlx::postgres::PgRow) -> Result<ChatMessage> {
        let citations: serde_json::Value = row.get("citations");
        let citations: Vec<Citation> = serde_json::from_value(citations)?;

        Ok(ChatMessage {
            id: row.get("id"),
            session_id: row.get("session_id"),
            role: MessageRole::parse(row.get("role")),
            content: row.get("content"),
            citations,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl ChatRepository for PgChatRepository {
    async fn get_or_create_session(&self, document_id: Uuid, user_id: &str) -> Result<ChatSession> {
        // ON CONFLICT DO NOTHING + re-select keeps session creation
        // idempotent under concurrent first messages.
        let id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO chat_session (id, document_id, user_id, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (document_id, user_id) DO NOTHING",
        )
        .bind(id)
        .bind(document_id)
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let row = sqlx::query(
            "SELECT id, document_id, user_id, created_at
             FROM chat_session WHERE document_id = $1 AND user_id = $2",
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(ChatSession {
            id: row.get("id"),
            document_id: row.get("document_id"),
            user_id: row.get("user_id"),
            created_at: row.get("created_at"),
        })
    }

    async fn add_message(&self, message: ChatMessage) -> Result<()> {
        let citations = serde_json::to_value(&message.citations)?;

        sqlx::query(
            "INSERT INTO chat_message (id, session_id, role, content, citations, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.id)
        .bind(message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(citations)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn recent_messages(&self, session_id: Uuid, limit: i64) -> Result<Vec<ChatMessage>> {
        // Fetch newest-first, then reverse into chronological order.
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, citations, created_at
             FROM chat_message WHERE session_id = $1
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut messages: Vec<ChatMessage> = rows
            .into_iter()
            .map(Self::parse_message_row)
            .collect::<Result<_>>()?;
        messages.reverse();
        Ok(messages)
    }
}
