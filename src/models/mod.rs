pub mod conversation;
pub mod message;
pub mod user;

pub use conversation::{Conversation, ConversationSummary};
pub use message::{Message, MessageType, NewMessage};
pub use user::UserProfile;
