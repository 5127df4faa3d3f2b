use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, MessageType, NewMessage, UserProfile};

use super::ChatStore;

/// PostgreSQL-backed store. The canonical-pair uniqueness lives in the
/// `conversations_pair_unique` constraint; the newest-wins pointer update is a
/// single conditional UPDATE with a row comparison.
#[derive(Clone)]
pub struct PgChatStore {
    pool: Pool<Postgres>,
}

impl PgChatStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn conversation_from_row(row: &sqlx::postgres::PgRow) -> Conversation {
        Conversation {
            id: row.get("id"),
            participant_a: row.get("participant_a"),
            participant_b: row.get("participant_b"),
            last_message_id: row.try_get("last_message_id").ok(),
            last_message_at: row.try_get("last_message_at").ok(),
            last_message_seq: row.try_get("last_message_seq").ok(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn message_from_row(row: &sqlx::postgres::PgRow) -> AppResult<Message> {
        let raw_type: String = row.get("message_type");
        let message_type = MessageType::from_str(&raw_type).ok_or_else(|| {
            AppError::Internal(format!("unknown message_type in storage: {raw_type}"))
        })?;
        Ok(Message {
            id: row.get("id"),
            conversation_id: row.get("conversation_id"),
            sender_id: row.get("sender_id"),
            content: row.get("content"),
            message_type,
            delivered_to: row.get("delivered_to"),
            is_read: row.get("is_read"),
            seq: row.get("seq"),
            created_at: row.get("created_at"),
        })
    }
}

fn map_insert_err(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict,
        _ => AppError::Storage(e),
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::conversation_from_row))
    }

    async fn find_by_participants(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT * FROM conversations WHERE participant_a = $1 AND participant_b = $2",
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(Self::conversation_from_row))
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO conversations (id, participant_a, participant_b, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(conversation.id)
        .bind(conversation.participant_a)
        .bind(conversation.participant_b)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_err)?;
        Ok(())
    }

    async fn conversations_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT * FROM conversations \
             WHERE participant_a = $1 OR participant_b = $1 \
             ORDER BY updated_at DESC \
             LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(Self::conversation_from_row).collect())
    }

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message> {
        let row = sqlx::query(
            "INSERT INTO messages \
               (id, conversation_id, sender_id, content, message_type, delivered_to) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING seq, created_at",
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(&message.delivered_to)
        .fetch_one(&self.pool)
        .await?;

        let seq: i64 = row.get("seq");
        let created_at: DateTime<Utc> = row.get("created_at");
        Ok(Message {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            delivered_to: message.delivered_to,
            is_read: false,
            seq,
            created_at,
        })
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::message_from_row).transpose()
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages \
             WHERE conversation_id = $1 \
             ORDER BY created_at ASC, seq ASC \
             LIMIT $2 OFFSET $3",
        )
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::message_from_row).collect()
    }

    async fn advance_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        seq: i64,
    ) -> AppResult<()> {
        // Row comparison keeps the pointer monotonic under interleaved sends.
        sqlx::query(
            "UPDATE conversations \
             SET last_message_id = $2, last_message_at = $3, last_message_seq = $4, \
                 updated_at = GREATEST(updated_at, $3) \
             WHERE id = $1 \
               AND (last_message_seq IS NULL OR (last_message_at, last_message_seq) < ($3, $4))",
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(at)
        .bind(seq)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_delivered(&self, message_id: Uuid, recipient_id: Uuid) -> AppResult<()> {
        // No-op when already delivered or when the message no longer exists.
        sqlx::query(
            "UPDATE messages SET delivered_to = array_append(delivered_to, $2) \
             WHERE id = $1 AND NOT (delivered_to @> ARRAY[$2])",
        )
        .bind(message_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_read(&self, message_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1 AND NOT is_read")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn unread_count(&self, conversation_id: Uuid, viewer_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::bigint FROM messages \
             WHERE conversation_id = $1 AND sender_id <> $2 AND NOT is_read",
        )
        .bind(conversation_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, full_name, email FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserProfile {
            id: r.get("id"),
            full_name: r.get("full_name"),
            email: r.get("email"),
        }))
    }

    async fn repair_last_messages(&self) -> AppResult<u64> {
        let result = sqlx::query(
            "WITH latest AS ( \
                 SELECT DISTINCT ON (conversation_id) conversation_id, id, created_at, seq \
                 FROM messages \
                 ORDER BY conversation_id, created_at DESC, seq DESC \
             ) \
             UPDATE conversations c \
             SET last_message_id = l.id, last_message_at = l.created_at, last_message_seq = l.seq \
             FROM latest l \
             WHERE c.id = l.conversation_id \
               AND c.last_message_id IS DISTINCT FROM l.id",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
