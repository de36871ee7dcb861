//! Device-local custody of the private key.
//!
//! The [`KeyStore`] is a thin wrapper over a [`SecretStorage`] backend with a
//! single slot named [`PRIVATE_KEY_SLOT`]. It is passed explicitly to whoever
//! needs it (registration, the envelope cipher) so tests and multi-profile
//! setups can swap the backend.

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{self, PrivateKeyHandle};
use crate::protect::{self, KdfParams, ProtectedKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Storage key under which the private key text is kept.
pub const PRIVATE_KEY_SLOT: &str = "privateKey";

/// Durable device-local string storage.
///
/// Writes are last-write-wins; there is no merge.
pub trait SecretStorage: Send + Sync {
    fn get(&self, key: &str) -> CryptoResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> CryptoResult<()>;
    fn remove(&self, key: &str) -> CryptoResult<()>;
}

/// Volatile in-process storage. Contents are lost when dropped.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Zeroizing<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStorage for MemoryStorage {
    fn get(&self, key: &str) -> CryptoResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| CryptoError::Storage(e.to_string()))?;
        Ok(entries.get(key).map(|v| v.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> CryptoResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CryptoError::Storage(e.to_string()))?;
        entries.insert(key.to_string(), Zeroizing::new(value.to_string()));
        Ok(())
    }

    fn remove(&self, key: &str) -> CryptoResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| CryptoError::Storage(e.to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

struct Protection {
    passphrase: Zeroizing<String>,
    kdf: KdfParams,
}

/// Owner of the device's private key.
pub struct KeyStore {
    storage: Arc<dyn SecretStorage>,
    protection: Option<Protection>,
}

impl KeyStore {
    /// Key store that keeps the private key text as-is in `storage`.
    pub fn new(storage: Arc<dyn SecretStorage>) -> Self {
        Self {
            storage,
            protection: None,
        }
    }

    /// Key store backed by a fresh [`MemoryStorage`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Key store that encrypts the slot under `passphrase` (Argon2id +
    /// ChaCha20-Poly1305).
    pub fn with_passphrase(
        storage: Arc<dyn SecretStorage>,
        passphrase: &str,
        kdf: KdfParams,
    ) -> Self {
        Self {
            storage,
            protection: Some(Protection {
                passphrase: Zeroizing::new(passphrase.to_string()),
                kdf,
            }),
        }
    }

    /// Whether the slot is encrypted under a passphrase.
    pub fn is_protected(&self) -> bool {
        self.protection.is_some()
    }

    /// Whether a private key has been stored on this device.
    pub fn has_private_key(&self) -> CryptoResult<bool> {
        Ok(self.storage.get(PRIVATE_KEY_SLOT)?.is_some())
    }

    /// Stores the encoded private key, replacing any previous one.
    ///
    /// The text must be a base64 PKCS#8 X25519 key.
    pub fn persist_private_key(&self, private_key_text: &str) -> CryptoResult<()> {
        keys::import_private_key(private_key_text)?;

        match &self.protection {
            Some(p) => {
                let blob = protect::protect_private_key(private_key_text, &p.passphrase, &p.kdf)?;
                self.storage.set(PRIVATE_KEY_SLOT, &blob.to_json()?)?;
            }
            None => self.storage.set(PRIVATE_KEY_SLOT, private_key_text)?,
        }

        info!(protected = self.is_protected(), "persisted private key");
        Ok(())
    }

    /// Loads the stored private key for decryption.
    ///
    /// Returns [`CryptoError::KeyNotFound`] when nothing has been stored on
    /// this device, which is the expected state on a new device.
    pub fn retrieve_private_key(&self) -> CryptoResult<PrivateKeyHandle> {
        let stored = Zeroizing::new(
            self.storage
                .get(PRIVATE_KEY_SLOT)?
                .ok_or(CryptoError::KeyNotFound)?,
        );

        let handle = match &self.protection {
            Some(p) => {
                let blob = ProtectedKey::from_json(&stored)?;
                let text = protect::unprotect_private_key(&blob, &p.passphrase)?;
                keys::import_private_key(&text)
            }
            None => keys::import_private_key(&stored),
        };

        handle.map_err(|e| match e {
            CryptoError::MalformedInput(msg) => {
                CryptoError::InvalidKey(format!("stored private key is corrupt: {msg}"))
            }
            other => other,
        })
    }

    /// Raw slot contents exactly as stored (passphrase-protected blob or
    /// plain key text), for [`KeyStore::restore_slot`].
    pub fn export_slot(&self) -> CryptoResult<Option<Zeroizing<String>>> {
        Ok(self.storage.get(PRIVATE_KEY_SLOT)?.map(Zeroizing::new))
    }

    /// Puts back a value returned by [`KeyStore::export_slot`]. `None`
    /// empties the slot.
    pub fn restore_slot(&self, value: Option<&str>) -> CryptoResult<()> {
        match value {
            Some(value) => self.storage.set(PRIVATE_KEY_SLOT, value)?,
            None => self.storage.remove(PRIVATE_KEY_SLOT)?,
        }
        debug!(restored = value.is_some(), "restored private key slot");
        Ok(())
    }

    /// Deletes the stored private key. A no-op if none is stored.
    pub fn clear_private_key(&self) -> CryptoResult<()> {
        self.storage.remove(PRIVATE_KEY_SLOT)?;
        debug!("cleared private key slot");
        Ok(())
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("protected", &self.is_protected())
            .finish_non_exhaustive()
    }
}
