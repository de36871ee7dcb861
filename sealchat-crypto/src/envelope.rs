//! Hybrid message envelopes.
//!
//! Each message gets a fresh AES-256-GCM key and 96-bit nonce. The message
//! is encrypted under that key, and the key itself is sealed to the
//! recipient's X25519 public key with an anonymous sealed box (ephemeral
//! X25519 + XSalsa20-Poly1305). The three pieces travel together as one JSON
//! object:
//!
//! ```json
//! { "encryptedMessage": "<base64>", "encryptedSymKey": "<base64>", "iv": "<base64>" }
//! ```
//!
//! An envelope is self-contained: the recipient's private key is the only
//! other input needed to open it.

use crate::codec;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{self, PrivateKeyHandle, PublicKeyHandle};
use crate::keystore::KeyStore;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

/// Symmetric key length (AES-256).
pub const SYMMETRIC_KEY_SIZE: usize = 32;
/// AES-GCM nonce length (96 bits).
pub const NONCE_SIZE: usize = 12;
/// AES-GCM authentication tag length.
pub const TAG_SIZE: usize = 16;
/// Sealed box overhead: ephemeral public key plus Poly1305 tag.
pub const SEAL_OVERHEAD: usize = 32 + 16;

/// Wire shape of a serialized envelope.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireEnvelope {
    encrypted_message: String,
    encrypted_sym_key: String,
    iv: String,
}

/// One encrypted message: ciphertext, sealed symmetric key and nonce.
///
/// Read-only once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    ciphertext: Vec<u8>,
    wrapped_key: Vec<u8>,
    nonce: Vec<u8>,
}

impl EncryptedEnvelope {
    pub fn new(ciphertext: Vec<u8>, wrapped_key: Vec<u8>, nonce: Vec<u8>) -> Self {
        Self {
            ciphertext,
            wrapped_key,
            nonce,
        }
    }

    /// AES-256-GCM ciphertext with the tag appended.
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Symmetric key sealed to the recipient's public key.
    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped_key
    }

    /// AES-GCM nonce.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Serializes to the JSON wire form.
    pub fn to_wire(&self) -> CryptoResult<String> {
        let wire = WireEnvelope {
            encrypted_message: codec::encode(&self.ciphertext),
            encrypted_sym_key: codec::encode(&self.wrapped_key),
            iv: codec::encode(&self.nonce),
        };
        serde_json::to_string(&wire)
            .map_err(|e| CryptoError::Encryption(format!("envelope serialization failed: {e}")))
    }

    /// Parses the JSON wire form.
    ///
    /// Structure problems (not an object, missing or extra fields, non-string
    /// values) are [`CryptoError::MalformedEnvelope`]; bad base64 inside a
    /// field is [`CryptoError::MalformedInput`].
    pub fn from_wire(text: &str) -> CryptoResult<Self> {
        let wire: WireEnvelope = serde_json::from_str(text)
            .map_err(|e| CryptoError::MalformedEnvelope(e.to_string()))?;
        Ok(Self {
            ciphertext: codec::decode(&wire.encrypted_message)?,
            wrapped_key: codec::decode(&wire.encrypted_sym_key)?,
            nonce: codec::decode(&wire.iv)?,
        })
    }
}

/// Encrypts `plaintext` for the holder of `recipient`'s private key.
///
/// The symmetric key only exists inside this call and is zeroized before it
/// returns.
pub fn seal(plaintext: &str, recipient: &PublicKeyHandle) -> CryptoResult<EncryptedEnvelope> {
    let mut key = Zeroizing::new([0u8; SYMMETRIC_KEY_SIZE]);
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(key.as_mut_slice())
        .and_then(|()| OsRng.try_fill_bytes(&mut nonce))
        .map_err(|e| CryptoError::Encryption(format!("random source unavailable: {e}")))?;

    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| CryptoError::Encryption(format!("symmetric key rejected: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("message encryption failed: {e}")))?;

    let wrapped_key = recipient
        .inner()
        .seal(&mut OsRng, key.as_slice())
        .map_err(|e| CryptoError::Encryption(format!("key wrap failed: {e}")))?;

    Ok(EncryptedEnvelope {
        ciphertext,
        wrapped_key,
        nonce: nonce.to_vec(),
    })
}

/// Decrypts an envelope with the recipient's private key.
///
/// Every failure here, whatever its cause, is [`CryptoError::Decryption`].
pub fn open(envelope: &EncryptedEnvelope, private_key: &PrivateKeyHandle) -> CryptoResult<String> {
    if envelope.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::Decryption(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            envelope.nonce.len()
        )));
    }

    let key = Zeroizing::new(
        private_key
            .inner()
            .unseal(&envelope.wrapped_key)
            .map_err(|_| {
                CryptoError::Decryption("key unwrap failed (wrong key or tampered data)".into())
            })?,
    );
    if key.len() != SYMMETRIC_KEY_SIZE {
        return Err(CryptoError::Decryption(format!(
            "unwrapped key must be {SYMMETRIC_KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| CryptoError::Decryption(format!("symmetric key rejected: {e}")))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| {
            CryptoError::Decryption("message authentication failed (tampered or corrupt)".into())
        })?;

    String::from_utf8(plaintext)
        .map_err(|_| CryptoError::Decryption("decrypted message is not UTF-8".into()))
}

/// Envelope encryption bound to a device [`KeyStore`].
///
/// Holds no per-call state: `encrypt` and `decrypt` may run concurrently
/// from any number of threads.
#[derive(Clone, Debug)]
pub struct EnvelopeCipher {
    keystore: Arc<KeyStore>,
}

impl EnvelopeCipher {
    pub fn new(keystore: Arc<KeyStore>) -> Self {
        Self { keystore }
    }

    pub fn keystore(&self) -> &Arc<KeyStore> {
        &self.keystore
    }

    /// Encrypts `plaintext` to a base64 SPKI public key and returns the
    /// serialized envelope.
    pub fn encrypt(&self, plaintext: &str, recipient_public_key: &str) -> CryptoResult<String> {
        let recipient = keys::import_public_key(recipient_public_key)?;
        let envelope = seal(plaintext, &recipient)?;
        let wire = envelope.to_wire()?;
        debug!(
            plaintext_len = plaintext.len(),
            envelope_len = wire.len(),
            "sealed message envelope"
        );
        Ok(wire)
    }

    /// Decrypts a serialized envelope with this device's private key.
    ///
    /// The envelope is parsed and decoded before the key store is consulted,
    /// so structural problems are reported even on a device without a key.
    pub fn decrypt(&self, envelope_text: &str) -> CryptoResult<String> {
        let envelope = EncryptedEnvelope::from_wire(envelope_text)?;
        let private_key = self.keystore.retrieve_private_key()?;
        open(&envelope, &private_key)
    }
}
