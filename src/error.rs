use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data source error: {0}")]
    Source(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("No trained model for newcomer threshold {threshold}")]
    ModelNotFound { threshold: u8 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for AppError {
    fn from(e: tokio::task::JoinError) -> Self {
        AppError::Internal(format!("Worker task failed: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
