//! X25519 key pair lifecycle.
//!
//! Keys leave this module only in their interchange encodings: the public
//! half as a DER `SubjectPublicKeyInfo`, the private half as a DER PKCS#8
//! `PrivateKeyInfo` (RFC 8410), each base64-encoded for transport.

use crate::codec;
use crate::error::{CryptoError, CryptoResult};
use crate::keystore::KeyStore;
use crypto_box::aead::OsRng;
use crypto_box::aead::rand_core::RngCore;
use crypto_box::{PublicKey, SecretKey};
use pkcs8::der::asn1::{BitStringRef, OctetStringRef};
use pkcs8::der::{Decode, Encode};
use pkcs8::spki::{AlgorithmIdentifierRef, SubjectPublicKeyInfoRef};
use pkcs8::{ObjectIdentifier, PrivateKeyInfo};
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

/// id-X25519 from RFC 8410.
pub const X25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.110");

/// Raw X25519 key length in bytes.
pub const KEY_SIZE: usize = 32;

fn x25519_algorithm() -> AlgorithmIdentifierRef<'static> {
    AlgorithmIdentifierRef {
        oid: X25519_OID,
        parameters: None,
    }
}

/// A freshly generated key pair in its exported (DER) form.
///
/// The public half is meant to be published; the private half belongs in the
/// device [`KeyStore`] and nowhere else.
pub struct KeyPair {
    public_der: Vec<u8>,
    private_der: Zeroizing<Vec<u8>>,
}

impl KeyPair {
    /// DER `SubjectPublicKeyInfo` bytes.
    pub fn public_key(&self) -> &[u8] {
        &self.public_der
    }

    /// DER PKCS#8 `PrivateKeyInfo` bytes.
    pub fn private_key(&self) -> &[u8] {
        &self.private_der
    }

    /// Base64 public key, as published to the user directory.
    pub fn public_key_text(&self) -> String {
        codec::encode(&self.public_der)
    }

    /// Base64 private key, as handed to [`KeyStore::persist_private_key`].
    pub fn private_key_text(&self) -> Zeroizing<String> {
        Zeroizing::new(codec::encode(&*self.private_der))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &codec::encode(&self.public_der))
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// A counterpart's public key, usable for encryption only.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKeyHandle(PublicKey);

impl PublicKeyHandle {
    pub(crate) fn inner(&self) -> &PublicKey {
        &self.0
    }

    /// Raw 32-byte Montgomery u-coordinate.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.0.as_bytes()
    }

    /// Re-exports the key in its base64 SPKI text form.
    pub fn to_text(&self) -> CryptoResult<String> {
        let der = encode_public_key(&self.0)
            .map_err(|e| CryptoError::InvalidKey(format!("public key export failed: {e}")))?;
        Ok(codec::encode(der))
    }
}

impl fmt::Debug for PublicKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PublicKeyHandle")
            .field(&codec::encode(self.0.as_bytes()))
            .finish()
    }
}

/// The device's private key, usable for decryption only.
///
/// There is deliberately no accessor for the raw scalar. The underlying
/// secret is zeroized when the handle is dropped.
pub struct PrivateKeyHandle(SecretKey);

impl PrivateKeyHandle {
    pub(crate) fn inner(&self) -> &SecretKey {
        &self.0
    }

    /// Derives the matching public key.
    pub fn public_key(&self) -> PublicKeyHandle {
        PublicKeyHandle(self.0.public_key())
    }
}

impl fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKeyHandle(<redacted>)")
    }
}

/// Generates a new X25519 key pair and exports both halves.
///
/// Fails with [`CryptoError::KeyGeneration`] if the OS random source is
/// unavailable; there is no fallback.
pub fn generate_key_pair() -> CryptoResult<KeyPair> {
    let mut scalar = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng
        .try_fill_bytes(scalar.as_mut_slice())
        .map_err(|e| CryptoError::KeyGeneration(format!("random source unavailable: {e}")))?;

    let secret = SecretKey::from(*scalar);
    let public = secret.public_key();

    let public_der = encode_public_key(&public)
        .map_err(|e| CryptoError::KeyGeneration(format!("public key export failed: {e}")))?;
    let private_der = encode_private_key(&secret)
        .map_err(|e| CryptoError::KeyGeneration(format!("private key export failed: {e}")))?;

    debug!(
        public_len = public_der.len(),
        private_len = private_der.len(),
        "generated X25519 key pair"
    );

    Ok(KeyPair {
        public_der,
        private_der,
    })
}

/// Generates a key pair and immediately persists the private half.
pub fn generate_and_persist(store: &KeyStore) -> CryptoResult<KeyPair> {
    let pair = generate_key_pair()?;
    store.persist_private_key(&pair.private_key_text())?;
    Ok(pair)
}

/// Imports a counterpart's base64 SPKI public key.
pub fn import_public_key(text: &str) -> CryptoResult<PublicKeyHandle> {
    let der = codec::decode(text)
        .map_err(|e| CryptoError::InvalidKey(format!("public key is not base64: {e}")))?;
    public_key_from_der(&der).map(PublicKeyHandle)
}

/// Imports a base64 PKCS#8 private key for decryption use.
pub fn import_private_key(text: &str) -> CryptoResult<PrivateKeyHandle> {
    let der = Zeroizing::new(codec::decode(text)?);
    secret_key_from_der(&der).map(PrivateKeyHandle)
}

/// Re-derives the published public key text from a stored private key text.
pub fn public_key_for(private_key_text: &str) -> CryptoResult<String> {
    import_private_key(private_key_text)?.public_key().to_text()
}

fn encode_public_key(public: &PublicKey) -> pkcs8::der::Result<Vec<u8>> {
    let spki = SubjectPublicKeyInfoRef {
        algorithm: x25519_algorithm(),
        subject_public_key: BitStringRef::from_bytes(public.as_bytes())?,
    };
    spki.to_der()
}

fn encode_private_key(secret: &SecretKey) -> pkcs8::der::Result<Zeroizing<Vec<u8>>> {
    let scalar = Zeroizing::new(secret.to_bytes());
    // RFC 8410 wraps the scalar in a CurvePrivateKey OCTET STRING
    let curve_private_key = Zeroizing::new(OctetStringRef::new(scalar.as_slice())?.to_der()?);
    let info = PrivateKeyInfo::new(x25519_algorithm(), &curve_private_key);
    Ok(Zeroizing::new(info.to_der()?))
}

fn public_key_from_der(der: &[u8]) -> CryptoResult<PublicKey> {
    let spki = SubjectPublicKeyInfoRef::from_der(der)
        .map_err(|e| CryptoError::InvalidKey(format!("not a SubjectPublicKeyInfo: {e}")))?;
    check_algorithm(&spki.algorithm)?;

    let raw = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| CryptoError::InvalidKey("public key bit string is not octet aligned".into()))?;
    let bytes: [u8; KEY_SIZE] = raw.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "expected {KEY_SIZE}-byte X25519 public key, got {}",
            raw.len()
        ))
    })?;
    if bytes == [0u8; KEY_SIZE] {
        return Err(CryptoError::InvalidKey("public key is the identity point".into()));
    }
    Ok(PublicKey::from(bytes))
}

fn secret_key_from_der(der: &[u8]) -> CryptoResult<SecretKey> {
    let info = PrivateKeyInfo::from_der(der)
        .map_err(|e| CryptoError::InvalidKey(format!("not a PKCS#8 private key: {e}")))?;
    check_algorithm(&info.algorithm)?;

    let curve_private_key = OctetStringRef::from_der(info.private_key)
        .map_err(|e| CryptoError::InvalidKey(format!("bad CurvePrivateKey: {e}")))?;
    let raw = curve_private_key.as_bytes();
    let bytes: [u8; KEY_SIZE] = raw.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!(
            "expected {KEY_SIZE}-byte X25519 private key, got {}",
            raw.len()
        ))
    })?;
    let bytes = Zeroizing::new(bytes);
    Ok(SecretKey::from(*bytes))
}

fn check_algorithm(algorithm: &AlgorithmIdentifierRef<'_>) -> CryptoResult<()> {
    if algorithm.oid != X25519_OID {
        return Err(CryptoError::InvalidKey(format!(
            "unsupported key algorithm {}",
            algorithm.oid
        )));
    }
    if algorithm.parameters.is_some() {
        return Err(CryptoError::InvalidKey(
            "X25519 algorithm identifier must not carry parameters".into(),
        ));
    }
    Ok(())
}
