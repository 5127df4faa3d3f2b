use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationSummary, Message, UserProfile};
use crate::store::ChatStore;

/// Everything a caller needs after joining a conversation: the record itself,
/// the counterpart's public profile, the current last message and a bounded
/// page of history.
#[derive(Debug, Clone)]
pub struct JoinedConversation {
    pub conversation: Conversation,
    pub counterpart: Option<UserProfile>,
    pub last_message: Option<Message>,
    pub messages: Vec<Message>,
}

pub struct ChatService;

impl ChatService {
    /// Find-or-create the conversation for a participant pair, idempotently
    /// under concurrent joins: the pair uniqueness constraint is the source of
    /// truth, and losing the create race means re-fetching the winner.
    pub async fn join_conversation(
        store: &dyn ChatStore,
        user_id: Uuid,
        other_user_id: Uuid,
        history_limit: i64,
    ) -> AppResult<JoinedConversation> {
        if user_id.is_nil() || other_user_id.is_nil() {
            return Err(AppError::InvalidArgument("user ids must be non-nil".into()));
        }
        if user_id == other_user_id {
            return Err(AppError::InvalidArgument(
                "cannot open a conversation with yourself".into(),
            ));
        }

        let (a, b) = Conversation::canonical_pair(user_id, other_user_id);
        let conversation = match store.find_by_participants(a, b).await? {
            Some(existing) => existing,
            None => {
                let fresh = Conversation::new(a, b);
                match store.insert_conversation(&fresh).await {
                    Ok(()) => fresh,
                    Err(AppError::Conflict) => {
                        tracing::debug!(%a, %b, "lost conversation create race, re-fetching winner");
                        store.find_by_participants(a, b).await?.ok_or_else(|| {
                            AppError::Internal("conversation vanished after create race".into())
                        })?
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        // user_id is one of (a, b) by construction
        let counterpart_id = conversation
            .counterpart_of(user_id)
            .ok_or_else(|| AppError::Internal("joined user missing from pair".into()))?;
        let counterpart = store.get_profile(counterpart_id).await?;

        let last_message = match conversation.last_message_id {
            Some(id) => store.get_message(id).await?,
            None => None,
        };
        let messages = store.list_messages(conversation.id, history_limit, 0).await?;

        Ok(JoinedConversation {
            conversation,
            counterpart,
            last_message,
            messages,
        })
    }

    /// Read-only directory listing: the user's conversations, newest activity
    /// first, with counterpart profile, last message and unread count. Paged
    /// with `limit`/`offset`; every conversation is reachable by walking pages.
    pub async fn list_conversations(
        store: &dyn ChatStore,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ConversationSummary>> {
        if user_id.is_nil() {
            return Err(AppError::InvalidArgument("user id must be non-nil".into()));
        }

        let conversations = store.conversations_for_user(user_id, limit, offset).await?;
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let counterpart = match conversation.counterpart_of(user_id) {
                Some(id) => store.get_profile(id).await?,
                None => None,
            };
            let last_message = match conversation.last_message_id {
                Some(id) => store.get_message(id).await?,
                None => None,
            };
            let unread_count = store.unread_count(conversation.id, user_id).await?;
            summaries.push(ConversationSummary {
                conversation_id: conversation.id,
                counterpart,
                last_message,
                unread_count,
                updated_at: conversation.updated_at,
            });
        }
        Ok(summaries)
    }
}
