use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Message, MessageType, NewMessage};
use crate::store::ChatStore;

pub struct MessageService;

impl MessageService {
    /// Append a message and advance the conversation's last-message pointer.
    ///
    /// The two writes are deliberately not one transaction: the insert happens
    /// first, and the pointer update is a newest-wins conditional write. If the
    /// pointer write fails the message still exists; the periodic repair pass
    /// reconciles the pointer from the true latest message.
    pub async fn send_message(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: MessageType,
        recipients: Vec<Uuid>,
    ) -> AppResult<Message> {
        if conversation_id.is_nil() || sender_id.is_nil() {
            return Err(AppError::InvalidArgument("ids must be non-nil".into()));
        }
        let conversation = store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        if !conversation.has_participant(sender_id) {
            return Err(AppError::InvalidArgument(
                "sender is not a participant of this conversation".into(),
            ));
        }
        if message_type == MessageType::Text && content.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "text messages require content".into(),
            ));
        }

        // Delivery can only be claimed for the counterpart participant.
        let mut delivered_to: Vec<Uuid> = recipients
            .into_iter()
            .filter(|r| *r != sender_id && conversation.has_participant(*r))
            .collect();
        delivered_to.sort();
        delivered_to.dedup();

        let message = store
            .insert_message(NewMessage {
                id: Uuid::new_v4(),
                conversation_id,
                sender_id,
                content,
                message_type,
                delivered_to,
            })
            .await?;

        if let Err(e) = store
            .advance_last_message(conversation_id, message.id, message.created_at, message.seq)
            .await
        {
            tracing::warn!(
                error = %e,
                %conversation_id,
                message_id = %message.id,
                "failed to advance last-message pointer; repair pass will reconcile"
            );
        }

        Ok(message)
    }

    /// Record delivery of a message to a recipient. Idempotent; a message that
    /// no longer exists is treated as already processed. Delivery can only be
    /// claimed by the counterpart participant, same as the send path.
    pub async fn mark_delivered(
        store: &dyn ChatStore,
        message_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<()> {
        if message_id.is_nil() || recipient_id.is_nil() {
            return Err(AppError::InvalidArgument("ids must be non-nil".into()));
        }
        let message = match store.get_message(message_id).await? {
            Some(message) => message,
            None => return Ok(()),
        };
        let conversation = store
            .get_conversation(message.conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        if recipient_id == message.sender_id || !conversation.has_participant(recipient_id) {
            return Err(AppError::InvalidArgument(
                "recipient is not the counterpart of this message".into(),
            ));
        }
        store.mark_delivered(message_id, recipient_id).await
    }

    /// Mark a message read. Idempotent and one-way.
    pub async fn mark_read(store: &dyn ChatStore, message_id: Uuid) -> AppResult<()> {
        if message_id.is_nil() {
            return Err(AppError::InvalidArgument("message id must be non-nil".into()));
        }
        store.mark_read(message_id).await
    }

    /// Ordered history page for a conversation.
    pub async fn list_messages(
        store: &dyn ChatStore,
        conversation_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Message>> {
        store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound("conversation"))?;
        store.list_messages(conversation_id, limit, offset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chat_service::ChatService;
    use crate::store::{ChatStore, MemoryChatStore};
    use std::sync::Arc;

    async fn setup() -> (MemoryChatStore, Uuid, Uuid, Uuid) {
        let store = MemoryChatStore::new();
        let (u1, u2) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = ChatService::join_conversation(&store, u1, u2, 100)
            .await
            .unwrap()
            .conversation;
        (store, conv.id, u1, u2)
    }

    #[tokio::test]
    async fn send_rejects_unknown_conversation_and_outsiders() {
        let (store, conv_id, u1, _u2) = setup().await;

        let err = MessageService::send_message(
            &store,
            Uuid::new_v4(),
            u1,
            "hi".into(),
            MessageType::Text,
            vec![],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound("conversation")));

        let outsider = Uuid::new_v4();
        let err = MessageService::send_message(
            &store,
            conv_id,
            outsider,
            "hi".into(),
            MessageType::Text,
            vec![],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_but_blank_attachment_is_not() {
        let (store, conv_id, u1, _u2) = setup().await;

        let err = MessageService::send_message(
            &store,
            conv_id,
            u1,
            "   ".into(),
            MessageType::Text,
            vec![],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        MessageService::send_message(
            &store,
            conv_id,
            u1,
            String::new(),
            MessageType::Attachment,
            vec![],
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn recipients_are_filtered_to_the_counterpart() {
        let (store, conv_id, u1, u2) = setup().await;

        let msg = MessageService::send_message(
            &store,
            conv_id,
            u1,
            "hi".into(),
            MessageType::Text,
            vec![u2, u2, u1, Uuid::new_v4()],
        )
        .await
        .unwrap();
        assert_eq!(msg.delivered_to, vec![u2]);
        assert!(!msg.is_read);
    }

    #[tokio::test]
    async fn pointer_tracks_the_newest_message_under_concurrent_sends() {
        let (store, conv_id, u1, u2) = setup().await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..3 {
            let store = store.clone();
            let sender = if i % 2 == 0 { u1 } else { u2 };
            handles.push(tokio::spawn(async move {
                MessageService::send_message(
                    &*store,
                    conv_id,
                    sender,
                    format!("m{i}"),
                    MessageType::Text,
                    vec![],
                )
                .await
                .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = MessageService::list_messages(&*store, conv_id, 100, 0)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        let newest = history.last().unwrap();
        let conv = store.get_conversation(conv_id).await.unwrap().unwrap();
        assert_eq!(conv.last_message_id, Some(newest.id));
    }

    #[tokio::test]
    async fn history_is_ordered_and_pageable() {
        let (store, conv_id, u1, _u2) = setup().await;
        for i in 0..5 {
            MessageService::send_message(
                &store,
                conv_id,
                u1,
                format!("m{i}"),
                MessageType::Text,
                vec![],
            )
            .await
            .unwrap();
        }

        let all = MessageService::list_messages(&store, conv_id, 100, 0)
            .await
            .unwrap();
        let contents: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(all.windows(2).all(|w| (w[0].created_at, w[0].seq) <= (w[1].created_at, w[1].seq)));

        let page = MessageService::list_messages(&store, conv_id, 2, 2)
            .await
            .unwrap();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn delivery_is_restricted_to_the_counterpart() {
        let (store, conv_id, u1, u2) = setup().await;
        let msg = MessageService::send_message(
            &store,
            conv_id,
            u1,
            "hi".into(),
            MessageType::Text,
            vec![],
        )
        .await
        .unwrap();

        // Counterpart ack lands and is idempotent.
        MessageService::mark_delivered(&store, msg.id, u2).await.unwrap();
        MessageService::mark_delivered(&store, msg.id, u2).await.unwrap();
        let stored = store.get_message(msg.id).await.unwrap().unwrap();
        assert_eq!(stored.delivered_to, vec![u2]);

        // Neither an outsider nor the sender may claim delivery.
        let err = MessageService::mark_delivered(&store, msg.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
        let err = MessageService::mark_delivered(&store, msg.id, u1)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        // A message that no longer exists is an already-processed no-op.
        MessageService::mark_delivered(&store, Uuid::new_v4(), u2)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn read_is_one_way_and_idempotent() {
        let (store, conv_id, u1, _u2) = setup().await;
        let msg = MessageService::send_message(
            &store,
            conv_id,
            u1,
            "hi".into(),
            MessageType::Text,
            vec![],
        )
        .await
        .unwrap();

        MessageService::mark_read(&store, msg.id).await.unwrap();
        MessageService::mark_read(&store, msg.id).await.unwrap();
        let stored = store.get_message(msg.id).await.unwrap().unwrap();
        assert!(stored.is_read);

        // Missing message acks are already-processed no-ops.
        MessageService::mark_read(&store, Uuid::new_v4()).await.unwrap();
    }
}
