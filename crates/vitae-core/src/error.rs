use thiserror::Error;

pub type VitaeResult<T> = Result<T, VitaeError>;

#[derive(Debug, Error)]
pub enum VitaeError {
    #[error("storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("integrity error at block {index}: {reason}")]
    Integrity { index: u64, reason: String },

    #[error("block {index} is encrypted at rest but no decryption key is available")]
    MissingKey { index: u64 },

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VitaeError {
    /// True for errors raised because stored data failed an integrity or
    /// authenticity check, as opposed to environmental failures.
    pub fn is_tamper(&self) -> bool {
        matches!(
            self,
            VitaeError::Integrity { .. } | VitaeError::Decryption(_) | VitaeError::MissingKey { .. }
        )
    }
}
