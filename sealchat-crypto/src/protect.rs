//! Passphrase protection for the private key at rest.
//!
//! Argon2id derives a 256-bit key from the passphrase; ChaCha20-Poly1305
//! encrypts the base64 PKCS#8 text under it. Salt, nonce and KDF parameters
//! travel with the blob so the passphrase is the only other input.

use crate::codec;
use crate::error::{CryptoError, CryptoResult};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Salt length for Argon2id.
pub const SALT_SIZE: usize = 16;
/// ChaCha20-Poly1305 nonce length.
pub const NONCE_SIZE: usize = 12;

const DERIVED_KEY_SIZE: usize = 32;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Never use for real keys.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn argon2(&self) -> CryptoResult<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(DERIVED_KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid Argon2 parameters: {e}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// A private key encrypted under a passphrase.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtectedKey {
    pub kdf: KdfParams,
    /// Base64 Argon2id salt.
    pub salt: String,
    /// Base64 ChaCha20-Poly1305 nonce.
    pub nonce: String,
    /// Base64 ciphertext including the Poly1305 tag.
    pub ciphertext: String,
    /// Unix timestamp when the key was protected.
    pub created_at: i64,
}

impl ProtectedKey {
    pub fn to_json(&self) -> CryptoResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CryptoError::Storage(format!("protected key serialization failed: {e}")))
    }

    pub fn from_json(text: &str) -> CryptoResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| CryptoError::Storage(format!("stored key is not a protected key: {e}")))
    }
}

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    params: &KdfParams,
) -> CryptoResult<Zeroizing<[u8; DERIVED_KEY_SIZE]>> {
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_SIZE]);
    params
        .argon2()?
        .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2id failed: {e}")))?;
    Ok(key)
}

/// Encrypts a base64 private key text under `passphrase`.
pub fn protect_private_key(
    private_key_text: &str,
    passphrase: &str,
    params: &KdfParams,
) -> CryptoResult<ProtectedKey> {
    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut salt)
        .and_then(|()| OsRng.try_fill_bytes(&mut nonce))
        .map_err(|e| CryptoError::Encryption(format!("random source unavailable: {e}")))?;

    let key = derive_key(passphrase, &salt, params)?;
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_slice())
        .map_err(|e| CryptoError::Encryption(format!("invalid derived key: {e}")))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), private_key_text.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("key protection failed: {e}")))?;

    Ok(ProtectedKey {
        kdf: *params,
        salt: codec::encode(salt),
        nonce: codec::encode(nonce),
        ciphertext: codec::encode(ciphertext),
        created_at: chrono::Utc::now().timestamp(),
    })
}

/// Recovers the base64 private key text from a [`ProtectedKey`].
///
/// A wrong passphrase and a tampered blob are indistinguishable and both
/// yield [`CryptoError::InvalidPassphrase`].
pub fn unprotect_private_key(
    protected: &ProtectedKey,
    passphrase: &str,
) -> CryptoResult<Zeroizing<String>> {
    let salt = codec::decode(&protected.salt)?;
    let nonce = codec::decode(&protected.nonce)?;
    let ciphertext = codec::decode(&protected.ciphertext)?;
    if nonce.len() != NONCE_SIZE {
        return Err(CryptoError::InvalidKey(format!(
            "protected key nonce must be {NONCE_SIZE} bytes, got {}",
            nonce.len()
        )));
    }

    let key = derive_key(passphrase, &salt, &protected.kdf)?;
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_slice())
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid derived key: {e}")))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| CryptoError::InvalidPassphrase)?,
    );

    String::from_utf8(plaintext.to_vec())
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::InvalidKey("protected key is not UTF-8 text".into()))
}
