//! Wire protocol of the chat gateway.
//!
//! One JSON event per text frame, tagged on `"type"`. Both directions are
//! closed unions: an event the server does not know is rejected at the
//! boundary instead of being shape-checked ad hoc in handlers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ConversationSummary, Message, MessageType, UserProfile};

/// Events a client may send over the socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Open (or create) the conversation with another user and subscribe to it.
    #[serde(rename = "join")]
    Join { user_id: Uuid, other_user_id: Uuid },

    /// Send a message to a joined conversation.
    #[serde(rename = "send")]
    Send {
        conversation_id: Uuid,
        sender_id: Uuid,
        content: String,
        message_type: MessageType,
        #[serde(default)]
        recipients: Vec<Uuid>,
    },

    /// Acknowledge delivery of a message to this connection's user.
    #[serde(rename = "delivered")]
    Delivered { message_id: Uuid },

    /// Mark a message read.
    #[serde(rename = "read")]
    Read { message_id: Uuid },

    /// Fetch an ordered history page.
    #[serde(rename = "list_messages")]
    ListMessages {
        conversation_id: Uuid,
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        offset: Option<i64>,
    },

    /// Fetch the conversation directory for this connection's user.
    #[serde(rename = "list_conversations")]
    ListConversations {
        user_id: Uuid,
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        offset: Option<i64>,
    },
}

/// Events the server sends. `message.new` is the only broadcast; everything
/// else goes to the originating connection only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "conversation.joined")]
    ConversationJoined {
        conversation_id: Uuid,
        counterpart: Option<UserProfile>,
        last_message: Option<Message>,
        messages: Vec<Message>,
    },

    #[serde(rename = "message.new")]
    MessageNew { message: Message },

    #[serde(rename = "message.history")]
    MessageHistory {
        conversation_id: Uuid,
        messages: Vec<Message>,
    },

    #[serde(rename = "conversation.list")]
    ConversationList {
        conversations: Vec<ConversationSummary>,
    },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn from_error(err: &AppError) -> Self {
        ServerEvent::Error {
            code: err.code().to_string(),
            message: err.public_message(),
        }
    }

    /// Serialize into a websocket text frame. This is the only place outbound
    /// events are serialized.
    pub fn to_ws_message(&self) -> Result<axum::extract::ws::Message, serde_json::Error> {
        Ok(axum::extract::ws::Message::Text(serde_json::to_string(
            self,
        )?))
    }
}
