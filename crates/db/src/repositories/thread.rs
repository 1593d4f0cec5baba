use chatty_core::chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use chatty_core::{ChatMessage, ChatThread};

use super::{is_unique_violation, RepositoryError, ThreadRepository};
use crate::DbPool;

pub struct SqlThreadRepository {
    pool: DbPool,
}

impl SqlThreadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ThreadRepository for SqlThreadRepository {
    async fn find_by_id(&self, id: &str) -> Result<Option<ChatThread>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                agent_slug,
                session_id,
                openai_thread_id,
                messages_json,
                created_at,
                last_message_at
             FROM chat_thread
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(thread_from_row).transpose()
    }

    async fn find_by_session(
        &self,
        agent_slug: &str,
        session_id: &str,
    ) -> Result<Option<ChatThread>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                agent_slug,
                session_id,
                openai_thread_id,
                messages_json,
                created_at,
                last_message_at
             FROM chat_thread
             WHERE agent_slug = ? AND session_id = ?",
        )
        .bind(agent_slug)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(thread_from_row).transpose()
    }

    async fn insert(&self, thread: &ChatThread) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO chat_thread (
                id,
                agent_slug,
                session_id,
                openai_thread_id,
                messages_json,
                created_at,
                last_message_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&thread.id)
        .bind(&thread.agent_slug)
        .bind(&thread.session_id)
        .bind(thread.openai_thread_id.as_deref())
        .bind(encode_messages(thread)?)
        .bind(thread.created_at.to_rfc3339())
        .bind(thread.last_message_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                RepositoryError::Conflict(format!(
                    "a thread already exists for agent `{}` and session `{}`",
                    thread.agent_slug, thread.session_id
                ))
            } else {
                RepositoryError::Database(error)
            }
        })?;

        Ok(())
    }

    async fn update(&self, thread: &ChatThread) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE chat_thread SET
                openai_thread_id = ?,
                messages_json = ?,
                last_message_at = ?
             WHERE id = ?",
        )
        .bind(thread.openai_thread_id.as_deref())
        .bind(encode_messages(thread)?)
        .bind(thread.last_message_at.to_rfc3339())
        .bind(&thread.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn thread_from_row(row: SqliteRow) -> Result<ChatThread, RepositoryError> {
    let messages_json = row.try_get::<String, _>("messages_json")?;
    let messages: Vec<ChatMessage> = serde_json::from_str(&messages_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid transcript in `messages_json`: {error}"))
    })?;

    Ok(ChatThread {
        id: row.try_get("id")?,
        agent_slug: row.try_get("agent_slug")?,
        session_id: row.try_get("session_id")?,
        openai_thread_id: row.try_get("openai_thread_id")?,
        messages,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        last_message_at: parse_timestamp("last_message_at", row.try_get("last_message_at")?)?,
    })
}

fn encode_messages(thread: &ChatThread) -> Result<String, RepositoryError> {
    serde_json::to_string(&thread.messages).map_err(|error| {
        RepositoryError::Decode(format!("could not encode transcript for `{}`: {error}", thread.id))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
