//! Notify port backed by the `messages` table.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Message, MessageType, Participant};
use crate::domain::ports::Notifier;

#[derive(Clone)]
pub struct SqliteNotifier {
    pool: SqlitePool,
}

impl SqliteNotifier {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Notifier for SqliteNotifier {
    async fn send(&self, message: &Message) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO messages (id, from_participant, to_participant, message_type, content, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(message.from.map(|p| p.to_storage()))
        .bind(message.to.to_storage())
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(serde_json::to_string(&message.metadata)?)
        .bind(format_datetime(message.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::NotificationFailed(e.to_string()))?;

        tracing::debug!(
            to = %message.to,
            message_type = message.message_type.as_str(),
            "Message delivered"
        );
        Ok(())
    }

    async fn inbox(&self, to: Participant, limit: i64) -> DomainResult<Vec<Message>> {
        let rows: Vec<MessageRow> =
            sqlx::query_as("SELECT * FROM messages WHERE to_participant = ? ORDER BY created_at DESC LIMIT ?")
                .bind(to.to_storage())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    from_participant: Option<String>,
    to_participant: String,
    message_type: String,
    content: String,
    metadata: String,
    created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = DomainError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let participant = |s: &str| {
            Participant::from_storage(s)
                .ok_or_else(|| DomainError::SerializationError(format!("Invalid participant: {s}")))
        };
        let message_type = MessageType::from_str(&row.message_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid message type: {}", row.message_type)))?;

        Ok(Message {
            id: parse_uuid(&row.id)?,
            from: row.from_participant.as_deref().map(participant).transpose()?,
            to: participant(&row.to_participant)?,
            message_type,
            content: row.content,
            metadata: serde_json::from_str(&row.metadata)?,
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
