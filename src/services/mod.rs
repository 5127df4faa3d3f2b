pub mod chat_service;
pub mod message_service;

pub use chat_service::{ChatService, JoinedConversation};
pub use message_service::MessageService;
