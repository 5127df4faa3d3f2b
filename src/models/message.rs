use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of message classifications. Anything else is rejected at the
/// protocol boundary instead of being carried as a free-form string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Attachment,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Attachment => "attachment",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "text" => Some(MessageType::Text),
            "attachment" => Some(MessageType::Attachment),
            _ => None,
        }
    }
}

/// A persisted chat message. Immutable after creation except for the
/// monotonic `delivered_to` set and the one-way `is_read` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub delivered_to: Vec<Uuid>,
    pub is_read: bool,
    /// Global insertion sequence; breaks `created_at` ties so history order is
    /// stable and reproducible.
    pub seq: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields the caller supplies on send; the store assigns `seq` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub message_type: MessageType,
    pub delivered_to: Vec<Uuid>,
}
