use dotenvy::dotenv;
use std::env;

/// Hard upper bound on any single history page, regardless of configuration.
pub const MAX_HISTORY_PAGE: i64 = 200;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Messages returned with a join ack and the default `list_messages` page.
    pub history_page_limit: i64,
    /// Conversations returned by `list_conversations`.
    pub conversation_page_limit: i64,
    /// Interval of the background last-message pointer repair pass.
    pub repair_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, crate::error::AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| crate::error::AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let history_page_limit = env::var("HISTORY_PAGE_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100)
            .clamp(1, MAX_HISTORY_PAGE);
        let conversation_page_limit = env::var("CONVERSATION_PAGE_LIMIT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100)
            .clamp(1, MAX_HISTORY_PAGE);
        let repair_interval_secs = env::var("LAST_MESSAGE_REPAIR_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);

        Ok(Self {
            database_url,
            port,
            history_page_limit,
            conversation_page_limit,
            repair_interval_secs,
        })
    }

    pub fn test_defaults() -> Self {
        Self {
            database_url: "postgres://localhost/chat_test".into(),
            port: 3000,
            history_page_limit: 100,
            conversation_page_limit: 100,
            repair_interval_secs: 60,
        }
    }
}
