use axum::extract::ws::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use uuid::Uuid;

pub mod events;
pub mod handlers;

/// Broadcast Router: conversation id -> the live connections subscribed to it.
///
/// Delivery is at-least-once, best-effort and in-process only; a connection
/// that is gone at broadcast time catches up later via `list_messages`.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    // conversation_id -> connection_id -> outbound channel
    inner: Arc<RwLock<HashMap<Uuid, HashMap<Uuid, UnboundedSender<Message>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a conversation's broadcast group. Re-joining
    /// replaces the previous sender for that connection.
    pub async fn subscribe(
        &self,
        conversation_id: Uuid,
        connection_id: Uuid,
        tx: UnboundedSender<Message>,
    ) {
        let mut guard = self.inner.write().await;
        guard
            .entry(conversation_id)
            .or_default()
            .insert(connection_id, tx);
    }

    /// Drop a connection from every group it joined. Called on disconnect.
    pub async fn remove_connection(&self, connection_id: Uuid) {
        let mut guard = self.inner.write().await;
        guard.retain(|_, subscribers| {
            subscribers.remove(&connection_id);
            !subscribers.is_empty()
        });
    }

    /// Fan a frame out to every live subscriber of a conversation. Dead peers
    /// are pruned as a side effect.
    pub async fn broadcast(&self, conversation_id: Uuid, msg: Message) {
        let mut guard = self.inner.write().await;
        if let Some(subscribers) = guard.get_mut(&conversation_id) {
            subscribers.retain(|_, tx| tx.send(msg.clone()).is_ok());
            if subscribers.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    pub async fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        self.inner
            .read()
            .await
            .get(&conversation_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}
