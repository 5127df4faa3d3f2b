use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;
use super::user::UserProfile;

/// The single direct conversation between an unordered pair of users.
///
/// Participants are stored canonically ordered (`participant_a < participant_b`)
/// so `(A, B)` and `(B, A)` always resolve to the same record; the store enforces
/// a uniqueness constraint on the ordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub last_message_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_seq: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Deterministic ordering of a participant pair, independent of argument
    /// order. Callers must reject `a == b` first.
    pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn new(a: Uuid, b: Uuid) -> Self {
        let (participant_a, participant_b) = Self::canonical_pair(a, b);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            participant_a,
            participant_b,
            last_message_id: None,
            last_message_at: None,
            last_message_seq: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.participant_a == user_id {
            Some(self.participant_b)
        } else if self.participant_b == user_id {
            Some(self.participant_a)
        } else {
            None
        }
    }
}

/// One row of `list_conversations`: the conversation seen from a viewer's side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub counterpart: Option<UserProfile>,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}
