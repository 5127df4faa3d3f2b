use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Benign concurrent-create race. Resolved internally by a re-fetch and
    /// never reported to a caller.
    #[error("conflict")]
    Conflict,

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code carried on `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidArgument(_) => "invalid_argument",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict => "conflict",
            AppError::Storage(_) => "storage_failure",
            AppError::Config(_) | AppError::StartServer(_) | AppError::Internal(_) => "internal",
        }
    }

    /// Message safe to send to a client. Storage and internal detail stays in
    /// the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::InvalidArgument(_) | AppError::NotFound(_) => self.to_string(),
            AppError::Storage(_) => "storage unavailable".to_string(),
            _ => "internal error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_are_redacted() {
        let err = AppError::Storage(sqlx::Error::PoolClosed);
        assert_eq!(err.code(), "storage_failure");
        assert_eq!(err.public_message(), "storage unavailable");
    }

    #[test]
    fn not_found_keeps_its_message() {
        let err = AppError::NotFound("conversation");
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.public_message(), "conversation not found");
    }
}
