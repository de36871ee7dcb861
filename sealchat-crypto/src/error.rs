//! Error taxonomy for the encryption core.

use thiserror::Error;

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors produced by the encryption core.
///
/// Every failure is surfaced to the caller as one of these variants; nothing
/// below this layer is logged and swallowed.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No private key has been provisioned on this device.
    #[error("private key not found on this device")]
    KeyNotFound,

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid passphrase for stored private key")]
    InvalidPassphrase,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("key storage error: {0}")]
    Storage(String),
}

impl CryptoError {
    /// True for failures that mean "this particular message cannot be read"
    /// as opposed to a device or configuration problem.
    pub fn is_unreadable_message(&self) -> bool {
        matches!(
            self,
            CryptoError::Decryption(_)
                | CryptoError::MalformedEnvelope(_)
                | CryptoError::MalformedInput(_)
        )
    }
}
