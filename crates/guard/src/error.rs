use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuardError>;

#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Cleanup strategy '{strategy}' failed: {reason}")]
    Cleanup { strategy: String, reason: String },

    #[error("Fallback failed: {0}")]
    Fallback(String),

    #[error("Chunker error: {0}")]
    Chunker(#[from] chunkflow_code_chunker::ChunkerError),

    #[error("Processing task failed: {0}")]
    Join(String),
}

impl GuardError {
    pub fn cleanup(strategy: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cleanup {
            strategy: strategy.into(),
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for GuardError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}
