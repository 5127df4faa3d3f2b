use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, Message, NewMessage, UserProfile};

use super::ChatStore;

#[derive(Default)]
struct Inner {
    profiles: HashMap<Uuid, UserProfile>,
    conversations: HashMap<Uuid, Conversation>,
    by_pair: HashMap<(Uuid, Uuid), Uuid>,
    messages: HashMap<Uuid, Message>,
}

/// In-memory store used by tests and local development. Mirrors the Postgres
/// implementation operation-for-operation: the pair index plays the role of the
/// uniqueness constraint and the pointer compare happens under the write lock.
#[derive(Default, Clone)]
pub struct MemoryChatStore {
    inner: Arc<RwLock<Inner>>,
    seq: Arc<AtomicI64>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user profile. In production the users table is populated by the
    /// identity service; tests use this instead.
    pub async fn insert_profile(&self, profile: UserProfile) {
        self.inner.write().await.profiles.insert(profile.id, profile);
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn get_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.conversations.get(&id).cloned())
    }

    async fn find_by_participants(&self, a: Uuid, b: Uuid) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard
            .by_pair
            .get(&(a, b))
            .and_then(|id| guard.conversations.get(id))
            .cloned())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let pair = (conversation.participant_a, conversation.participant_b);
        if guard.by_pair.contains_key(&pair) {
            return Err(AppError::Conflict);
        }
        guard.by_pair.insert(pair, conversation.id);
        guard
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(())
    }

    async fn conversations_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Conversation>> {
        let guard = self.inner.read().await;
        let mut out: Vec<Conversation> = guard
            .conversations
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        out.sort_by(|x, y| y.updated_at.cmp(&x.updated_at));
        Ok(out
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn insert_message(&self, message: NewMessage) -> AppResult<Message> {
        let mut guard = self.inner.write().await;
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut delivered_to = message.delivered_to;
        delivered_to.dedup();
        let stored = Message {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            message_type: message.message_type,
            delivered_to,
            is_read: false,
            seq,
            created_at: Utc::now(),
        };
        guard.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_message(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.inner.read().await.messages.get(&id).cloned())
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        let mut out: Vec<Message> = guard
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.created_at, m.seq));
        Ok(out
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn advance_last_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        at: DateTime<Utc>,
        seq: i64,
    ) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let conv = guard
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::NotFound("conversation"))?;
        let newer = match (conv.last_message_at, conv.last_message_seq) {
            (Some(cur_at), Some(cur_seq)) => (cur_at, cur_seq) < (at, seq),
            _ => true,
        };
        if newer {
            conv.last_message_id = Some(message_id);
            conv.last_message_at = Some(at);
            conv.last_message_seq = Some(seq);
        }
        if at > conv.updated_at {
            conv.updated_at = at;
        }
        Ok(())
    }

    async fn mark_delivered(&self, message_id: Uuid, recipient_id: Uuid) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if let Some(msg) = guard.messages.get_mut(&message_id) {
            if !msg.delivered_to.contains(&recipient_id) {
                msg.delivered_to.push(recipient_id);
            }
        }
        Ok(())
    }

    async fn mark_read(&self, message_id: Uuid) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if let Some(msg) = guard.messages.get_mut(&message_id) {
            msg.is_read = true;
        }
        Ok(())
    }

    async fn unread_count(&self, conversation_id: Uuid, viewer_id: Uuid) -> AppResult<i64> {
        let guard = self.inner.read().await;
        Ok(guard
            .messages
            .values()
            .filter(|m| {
                m.conversation_id == conversation_id && m.sender_id != viewer_id && !m.is_read
            })
            .count() as i64)
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.inner.read().await.profiles.get(&user_id).cloned())
    }

    async fn repair_last_messages(&self) -> AppResult<u64> {
        let mut guard = self.inner.write().await;
        let mut latest: HashMap<Uuid, (DateTime<Utc>, i64, Uuid)> = HashMap::new();
        for msg in guard.messages.values() {
            let entry = latest.entry(msg.conversation_id);
            let candidate = (msg.created_at, msg.seq, msg.id);
            entry
                .and_modify(|cur| {
                    if (candidate.0, candidate.1) > (cur.0, cur.1) {
                        *cur = candidate;
                    }
                })
                .or_insert(candidate);
        }
        let mut repaired = 0;
        for (conversation_id, (at, seq, id)) in latest {
            if let Some(conv) = guard.conversations.get_mut(&conversation_id) {
                if conv.last_message_id != Some(id) {
                    conv.last_message_id = Some(id);
                    conv.last_message_at = Some(at);
                    conv.last_message_seq = Some(seq);
                    repaired += 1;
                }
            }
        }
        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    fn new_message(conversation_id: Uuid, sender_id: Uuid) -> NewMessage {
        NewMessage {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: "hello".into(),
            message_type: MessageType::Text,
            delivered_to: Vec::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_pair_insert_conflicts() {
        let store = MemoryChatStore::new();
        let conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conv).await.unwrap();

        let dup = Conversation::new(conv.participant_a, conv.participant_b);
        assert!(matches!(
            store.insert_conversation(&dup).await,
            Err(AppError::Conflict)
        ));
    }

    #[tokio::test]
    async fn pointer_never_regresses() {
        let store = MemoryChatStore::new();
        let conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conv).await.unwrap();

        let m1 = store
            .insert_message(new_message(conv.id, conv.participant_a))
            .await
            .unwrap();
        let m2 = store
            .insert_message(new_message(conv.id, conv.participant_b))
            .await
            .unwrap();

        // Apply the newer pointer first, then try to move it backwards.
        store
            .advance_last_message(conv.id, m2.id, m2.created_at, m2.seq)
            .await
            .unwrap();
        store
            .advance_last_message(conv.id, m1.id, m1.created_at, m1.seq)
            .await
            .unwrap();

        let conv = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.last_message_id, Some(m2.id));
    }

    #[tokio::test]
    async fn mark_delivered_is_idempotent_and_tolerates_missing() {
        let store = MemoryChatStore::new();
        let conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conv).await.unwrap();
        let msg = store
            .insert_message(new_message(conv.id, conv.participant_a))
            .await
            .unwrap();

        store
            .mark_delivered(msg.id, conv.participant_b)
            .await
            .unwrap();
        store
            .mark_delivered(msg.id, conv.participant_b)
            .await
            .unwrap();
        let stored = store.get_message(msg.id).await.unwrap().unwrap();
        assert_eq!(stored.delivered_to, vec![conv.participant_b]);

        // Unknown message: treated as already processed.
        store
            .mark_delivered(Uuid::new_v4(), conv.participant_b)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn repair_recomputes_stale_pointer() {
        let store = MemoryChatStore::new();
        let conv = Conversation::new(Uuid::new_v4(), Uuid::new_v4());
        store.insert_conversation(&conv).await.unwrap();

        let m1 = store
            .insert_message(new_message(conv.id, conv.participant_a))
            .await
            .unwrap();
        let m2 = store
            .insert_message(new_message(conv.id, conv.participant_a))
            .await
            .unwrap();
        // Simulate a crashed pointer update: only m1 made it.
        store
            .advance_last_message(conv.id, m1.id, m1.created_at, m1.seq)
            .await
            .unwrap();

        let repaired = store.repair_last_messages().await.unwrap();
        assert_eq!(repaired, 1);
        let conv = store.get_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(conv.last_message_id, Some(m2.id));

        // Second pass finds nothing to do.
        assert_eq!(store.repair_last_messages().await.unwrap(), 0);
    }
}
