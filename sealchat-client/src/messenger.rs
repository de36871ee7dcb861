//! The message pipeline facade.
//!
//! Wraps the encryption core for the send/receive paths of a chat client.
//! Every operation is async: the cipher work runs on the blocking pool so a
//! UI or network task is never stalled behind key generation or decryption.
//! Nothing is cancelled once started; callers that no longer care about a
//! result (the user switched conversation) just drop it.

use crate::cache::{DecryptCache, cache_key, envelope_id, slot_fingerprint};
use crate::config::{ClientConfig, LogoutKeyPolicy};
use crate::directory::UserDirectory;
use crate::error::{ClientError, ClientResult};
use sealchat_crypto::{
    CryptoError, CryptoResult, EnvelopeCipher, KeyPair, KeyStore, MemoryStorage, SecretStorage,
    generate_key_pair,
};
use sealchat_storage::FileStorage;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Fingerprint of whatever key is currently stored, if any.
fn current_key_fingerprint(keystore: &KeyStore) -> CryptoResult<Option<String>> {
    Ok(keystore.export_slot()?.map(|slot| slot_fingerprint(&slot)))
}

async fn run_blocking<T, F>(f: F) -> ClientResult<T>
where
    F: FnOnce() -> CryptoResult<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// Registration, send and receive for one device profile.
#[derive(Clone)]
pub struct Messenger {
    config: ClientConfig,
    cipher: EnvelopeCipher,
    directory: Arc<dyn UserDirectory>,
    cache: DecryptCache,
}

impl Messenger {
    pub fn new(
        config: ClientConfig,
        keystore: Arc<KeyStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let cache = DecryptCache::new(config.decrypt_cache_capacity);
        Self {
            config,
            cipher: EnvelopeCipher::new(keystore),
            directory,
            cache,
        }
    }

    /// Builds the key store described by `config` and wires it up.
    ///
    /// `passphrase` is required when `config.passphrase_protection` is set
    /// and rejected when it is not.
    pub fn from_config(
        config: ClientConfig,
        passphrase: Option<&str>,
        directory: Arc<dyn UserDirectory>,
    ) -> ClientResult<Self> {
        config.validate()?;

        let storage: Arc<dyn SecretStorage> = match &config.key_storage_path {
            Some(path) => Arc::new(FileStorage::open(path).map_err(CryptoError::from)?),
            None => Arc::new(MemoryStorage::new()),
        };

        let keystore = match (config.passphrase_protection, passphrase) {
            (true, Some(passphrase)) => KeyStore::with_passphrase(storage, passphrase, config.kdf),
            (true, None) => {
                return Err(ClientError::Config(
                    "passphrase_protection is on but no passphrase was supplied".into(),
                ));
            }
            (false, Some(_)) => {
                return Err(ClientError::Config(
                    "a passphrase was supplied but passphrase_protection is off".into(),
                ));
            }
            (false, None) => KeyStore::new(storage),
        };

        Ok(Self::new(config, Arc::new(keystore), directory))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn keystore(&self) -> &Arc<KeyStore> {
        self.cipher.keystore()
    }

    pub fn cache(&self) -> &DecryptCache {
        &self.cache
    }

    /// Generates a key pair without storing or publishing anything.
    pub async fn generate_key_pair(&self) -> ClientResult<KeyPair> {
        run_blocking(generate_key_pair).await
    }

    /// Creates an identity for `username` on this device.
    ///
    /// The private key is stored before the public key is published, so a
    /// published key always has its private half on this device. If the
    /// directory rejects the name, the slot is put back the way it was.
    /// Returns the published public key.
    pub async fn register(&self, username: &str) -> ClientResult<String> {
        let pair = self.generate_key_pair().await?;
        let public_key = pair.public_key_text();

        let keystore = self.keystore().clone();
        let previous = run_blocking(move || {
            let previous = keystore.export_slot()?;
            keystore.persist_private_key(&pair.private_key_text())?;
            Ok(previous)
        })
        .await
        .inspect_err(|e| warn!(username, "could not store private key: {e}"))?;

        if let Err(e) = self.directory.register(username, &public_key).await {
            warn!(username, "registration rejected: {e}");
            let keystore = self.keystore().clone();
            let restored = run_blocking(move || {
                keystore.restore_slot(previous.as_deref().map(String::as_str))
            })
            .await;
            if let Err(restore_err) = restored {
                error!(username, "could not restore previous private key: {restore_err}");
            }
            return Err(e);
        }

        self.cache.clear().await;
        info!(username, "registered new identity");
        Ok(public_key)
    }

    /// Encrypts `plaintext` to a base64 public key; returns the envelope text.
    pub async fn encrypt_message(
        &self,
        plaintext: &str,
        recipient_public_key: &str,
    ) -> ClientResult<String> {
        let cipher = self.cipher.clone();
        let plaintext = zeroize::Zeroizing::new(plaintext.to_string());
        let recipient_public_key = recipient_public_key.to_string();
        run_blocking(move || cipher.encrypt(&plaintext, &recipient_public_key)).await
    }

    /// Looks up `username` in the directory and encrypts to their key.
    pub async fn encrypt_for(&self, username: &str, plaintext: &str) -> ClientResult<String> {
        let public_key = self.directory.get_public_key(username).await?;
        let envelope = self.encrypt_message(plaintext, &public_key).await?;
        debug!(recipient = username, "encrypted message");
        Ok(envelope)
    }

    /// Decrypts an envelope with this device's key, with typed failures.
    ///
    /// Cached plaintexts are only served while the key that produced them is
    /// still the one in the key store.
    pub async fn decrypt_message(&self, envelope_text: &str) -> ClientResult<String> {
        let keystore = self.keystore().clone();
        let fingerprint = run_blocking(move || current_key_fingerprint(&keystore)).await?;
        let id = fingerprint
            .as_deref()
            .map(|fingerprint| cache_key(fingerprint, envelope_text));

        if let Some(id) = &id {
            if let Some(plaintext) = self.cache.get(id).await {
                debug!(envelope = %envelope_id(envelope_text), "decrypt cache hit");
                return Ok(plaintext);
            }
        }

        let cipher = self.cipher.clone();
        let envelope_text = envelope_text.to_string();
        let (plaintext, fingerprint_after) = run_blocking(move || {
            let plaintext = cipher.decrypt(&envelope_text)?;
            let after = current_key_fingerprint(cipher.keystore()).ok().flatten();
            Ok((plaintext, after))
        })
        .await?;

        // Key replaced mid-decrypt: the plaintext is not tied to `id`
        if let Some(id) = id {
            if fingerprint_after == fingerprint {
                self.cache.insert(id, plaintext.clone()).await;
            }
        }
        Ok(plaintext)
    }

    /// Decrypts for display.
    ///
    /// A message that cannot be read (tampered, corrupt, encrypted to a
    /// different key) becomes the configured placeholder. A missing private
    /// key is still an error: the user needs to be told to restore it.
    pub async fn render_message(&self, envelope_text: &str) -> ClientResult<String> {
        match self.decrypt_message(envelope_text).await {
            Err(ClientError::Crypto(e)) if e.is_unreadable_message() => {
                warn!(envelope = %envelope_id(envelope_text), "showing placeholder: {e}");
                Ok(self.config.decrypt_placeholder.clone())
            }
            other => other,
        }
    }

    /// Renders a list of envelopes concurrently. Output order matches input.
    pub async fn render_conversation(&self, envelopes: &[String]) -> Vec<ClientResult<String>> {
        let handles: Vec<_> = envelopes
            .iter()
            .cloned()
            .map(|envelope| {
                let messenger = self.clone();
                tokio::spawn(async move { messenger.render_message(&envelope).await })
            })
            .collect();

        let mut rendered = Vec::with_capacity(handles.len());
        for handle in handles {
            rendered.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(ClientError::from(e)),
            });
        }
        rendered
    }

    /// Ends the session: drops cached plaintexts and applies the
    /// configured [`LogoutKeyPolicy`].
    pub async fn logout(&self) -> ClientResult<()> {
        self.cache.clear().await;

        match self.config.logout_policy {
            LogoutKeyPolicy::Retain => {
                info!("logged out; private key retained on device");
            }
            LogoutKeyPolicy::Delete => {
                let keystore = self.keystore().clone();
                run_blocking(move || keystore.clear_private_key()).await?;
                info!("logged out; private key deleted from device");
            }
        }
        Ok(())
    }
}
