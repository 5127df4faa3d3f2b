use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public profile fields of a user, as exposed to chat counterparts.
/// The users table is owned by the identity service; this service only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
}
