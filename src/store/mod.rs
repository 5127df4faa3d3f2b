use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, Message, NewMessage, UserProfile};

pub mod memory;
pub mod postgres;

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

/// Persistence seam for the chat engine.
///
/// The store is the only cross-request shared mutable resource. Two rules keep
/// it consistent under concurrency: the canonical participant pair is unique
/// (duplicate joins lose with [`AppError::Conflict`](crate::error::AppError) and
/// re-fetch), and the last-message pointer only moves forward
/// (`advance_last_message` is a newest-wins conditional write).
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// Lookup by canonical pair. Callers must pass the pair already ordered.
    async fn find_by_participants(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>>;

    /// Insert a new conversation. Returns `Conflict` when the canonical pair
    /// already exists (a concurrent join won the race).
    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()>;

    /// Conversations with `user_id` as a participant, most recently updated
    /// first. Paged so every conversation stays reachable past the first page.
    async fn conversations_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>>;

    /// Append a message. The store assigns `seq` and `created_at`.
    async fn insert_message(&self, message: NewMessage) -> AppResult<Message>;

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Messages of a conversation ordered by `(created_at, seq)` ascending.
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>>;

    /// Move the conversation's last-message pointer to `(message_id, at, seq)`
    /// unless it already references something newer. Also bumps `updated_at`.
    async fn advance_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        seq: i64,
    ) -> AppResult<()>;

    /// Add `recipient_id` to the message's delivery set. Idempotent; a missing
    /// message is treated as already processed.
    async fn mark_delivered(&self, message_id: Uuid, recipient_id: Uuid) -> AppResult<()>;

    /// Flip `is_read` to true. Idempotent and one-way; a missing message is a
    /// no-op.
    async fn mark_read(&self, message_id: Uuid) -> AppResult<()>;

    /// Messages in the conversation authored by someone other than `viewer_id`
    /// and not yet read.
    async fn unread_count(&self, conversation_id: Uuid, viewer_id: Uuid) -> AppResult<i64>;

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;

    /// Recompute every stale last-message pointer from the true latest message.
    /// Returns the number of conversations repaired.
    async fn repair_last_messages(&self) -> AppResult<u64>;
}
