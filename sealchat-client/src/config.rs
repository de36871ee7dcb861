//! Client configuration.

use crate::error::{ClientError, ClientResult};
use sealchat_crypto::KdfParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Text shown in place of a message that cannot be decrypted.
pub const DEFAULT_DECRYPT_PLACEHOLDER: &str = "[Encryption error: Could not decrypt message]";

/// What happens to the device's private key on logout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogoutKeyPolicy {
    /// Keep the key so history stays readable after logging back in. The key
    /// outlives the authenticated session on this device.
    #[default]
    Retain,
    /// Wipe the key. Messages received so far become unreadable on this
    /// device unless the key is restored.
    Delete,
}

/// Configuration for the message pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// File backing the private-key slot. `None` keeps the key in memory.
    pub key_storage_path: Option<PathBuf>,

    pub logout_policy: LogoutKeyPolicy,

    pub decrypt_placeholder: String,

    /// Maximum number of decrypted messages kept in memory. 0 disables the cache.
    pub decrypt_cache_capacity: usize,

    /// Encrypt the stored private key under a passphrase.
    pub passphrase_protection: bool,

    /// Argon2id costs used when `passphrase_protection` is on.
    pub kdf: KdfParams,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            key_storage_path: None,
            logout_policy: LogoutKeyPolicy::Retain,
            decrypt_placeholder: DEFAULT_DECRYPT_PLACEHOLDER.to_string(),
            decrypt_cache_capacity: 1024,
            passphrase_protection: false,
            kdf: KdfParams::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> ClientResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ClientError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.decrypt_placeholder.trim().is_empty() {
            return Err(ClientError::Config("decrypt_placeholder must not be empty".into()));
        }
        if self.kdf.memory_kib == 0 || self.kdf.iterations == 0 || self.kdf.parallelism == 0 {
            return Err(ClientError::Config("kdf costs must be non-zero".into()));
        }
        Ok(())
    }

    /// In-memory config for tests.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            kdf: KdfParams::insecure_fast(),
            log_filter: "debug".to_string(),
            ..Self::default()
        }
    }
}
