//! End-to-end encryption core for sealchat.
//!
//! Messages are encrypted on the sending device and decrypted only on the
//! receiving device; the storage tier never sees plaintext or private keys.
//!
//! # Architecture
//!
//! Encryption is hybrid:
//!
//! 1. **Identity key pair**: X25519, generated once per registration. The
//!    public half (DER SPKI, base64) is published to the user directory; the
//!    private half (DER PKCS#8, base64) stays in the device [`KeyStore`].
//!
//! 2. **Message key**: a fresh AES-256-GCM key and 96-bit nonce per
//!    message. The key is sealed to the recipient's public key and shipped
//!    inside the envelope next to the ciphertext.
//!
//! Components, leaves first:
//! - [`codec`]: base64 text <-> bytes
//! - [`keys`]: key pair generation, import and export
//! - [`keystore`]: device-local custody of the private key
//! - [`envelope`]: envelope construction and decryption
//! - [`protect`]: optional passphrase protection of the stored key

pub mod codec;
pub mod envelope;
mod error;
pub mod keys;
pub mod keystore;
pub mod protect;

pub use envelope::{EncryptedEnvelope, EnvelopeCipher, NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use keys::{
    KeyPair, PrivateKeyHandle, PublicKeyHandle, generate_and_persist, generate_key_pair,
    import_private_key, import_public_key, public_key_for,
};
pub use keystore::{KeyStore, MemoryStorage, PRIVATE_KEY_SLOT, SecretStorage};
pub use protect::{KdfParams, ProtectedKey};
