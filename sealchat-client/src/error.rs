//! Client error types.

use sealchat_crypto::CryptoError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the message pipeline.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A failure from the encryption core, passed through unchanged.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// True when this device has no private key yet.
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, ClientError::Crypto(CryptoError::KeyNotFound))
    }
}

impl From<tokio::task::JoinError> for ClientError {
    fn from(e: tokio::task::JoinError) -> Self {
        ClientError::Task(e.to_string())
    }
}
