//! End-to-end tests of the message pipeline: two devices sharing one
//! in-memory directory.

use pretty_assertions::assert_eq;
use sealchat_client::{
    ClientConfig, ClientError, DEFAULT_DECRYPT_PLACEHOLDER, LogoutKeyPolicy, MemoryDirectory,
    Messenger, UserDirectory,
};
use sealchat_crypto::{CryptoError, CryptoResult, KdfParams, KeyStore, SecretStorage, codec};
use std::sync::Arc;

/// Storage that can be read but never written, like a read-only profile.
struct ReadOnlyStorage;

impl SecretStorage for ReadOnlyStorage {
    fn get(&self, _key: &str) -> CryptoResult<Option<String>> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> CryptoResult<()> {
        Err(CryptoError::Storage("read-only file system".into()))
    }

    fn remove(&self, _key: &str) -> CryptoResult<()> {
        Ok(())
    }
}

fn device(directory: &Arc<MemoryDirectory>) -> Messenger {
    Messenger::new(
        ClientConfig::default(),
        Arc::new(KeyStore::in_memory()),
        directory.clone(),
    )
}

fn device_with(config: ClientConfig, directory: &Arc<MemoryDirectory>) -> Messenger {
    Messenger::from_config(config, None, directory.clone()).unwrap()
}

fn tamper(envelope: &str) -> String {
    let mut json: serde_json::Value = serde_json::from_str(envelope).unwrap();
    let mut bytes = codec::decode(json["encryptedMessage"].as_str().unwrap()).unwrap();
    bytes[0] ^= 0x01;
    json["encryptedMessage"] = serde_json::Value::String(codec::encode(&bytes));
    json.to_string()
}

#[tokio::test]
async fn bob_reads_alices_hello() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);

    alice.register("alice").await.unwrap();
    bob.register("bob").await.unwrap();

    let envelope = alice.encrypt_for("bob", "hello").await.unwrap();
    assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "hello");
}

#[tokio::test]
async fn register_publishes_key_and_stores_private_half() {
    let directory = Arc::new(MemoryDirectory::new());
    let bob = device(&directory);

    let public_key = bob.register("bob").await.unwrap();

    assert_eq!(directory.get_public_key("bob").await.unwrap(), public_key);
    assert!(bob.keystore().has_private_key().unwrap());
    let stored = bob.keystore().retrieve_private_key().unwrap();
    assert_eq!(stored.public_key().to_text().unwrap(), public_key);
}

#[tokio::test]
async fn taken_username_keeps_existing_device_key() {
    let directory = Arc::new(MemoryDirectory::new());
    let first = device(&directory);
    first.register("bob").await.unwrap();

    let second = device(&directory);
    let original = second.register("robert").await.unwrap();

    let err = second.register("bob").await.unwrap_err();
    assert!(matches!(err, ClientError::UsernameTaken(name) if name == "bob"));

    let stored = second.keystore().retrieve_private_key().unwrap();
    assert_eq!(stored.public_key().to_text().unwrap(), original);
}

#[tokio::test]
async fn taken_username_on_fresh_device_leaves_slot_empty() {
    let directory = Arc::new(MemoryDirectory::new());
    device(&directory).register("bob").await.unwrap();

    let fresh = device(&directory);
    let err = fresh.register("bob").await.unwrap_err();
    assert!(matches!(err, ClientError::UsernameTaken(_)));
    assert!(!fresh.keystore().has_private_key().unwrap());
}

#[tokio::test]
async fn failed_key_storage_does_not_publish() {
    let directory = Arc::new(MemoryDirectory::new());
    let broken = Messenger::new(
        ClientConfig::default(),
        Arc::new(KeyStore::new(Arc::new(ReadOnlyStorage))),
        directory.clone(),
    );

    let err = broken.register("bob").await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::Storage(_))));
    assert!(directory.is_empty().await);

    // The name is still free for a device that can store its key
    let working = device(&directory);
    let public_key = working.register("bob").await.unwrap();
    assert_eq!(directory.get_public_key("bob").await.unwrap(), public_key);
}

#[tokio::test]
async fn unknown_recipient() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let err = alice.encrypt_for("nobody", "hi").await.unwrap_err();
    assert!(matches!(err, ClientError::UserNotFound(name) if name == "nobody"));
}

#[tokio::test]
async fn new_device_without_key_gets_key_not_found() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "hello").await.unwrap();

    let bobs_new_laptop = device(&directory);
    let err = bobs_new_laptop.decrypt_message(&envelope).await.unwrap_err();
    assert!(err.is_key_not_found());

    // Still an error when rendering, not a placeholder
    let err = bobs_new_laptop.render_message(&envelope).await.unwrap_err();
    assert!(err.is_key_not_found());
}

#[tokio::test]
async fn render_replaces_unreadable_messages_with_placeholder() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    let carol = device(&directory);
    bob.register("bob").await.unwrap();
    carol.register("carol").await.unwrap();

    let good = alice.encrypt_for("bob", "readable").await.unwrap();
    let for_carol = alice.encrypt_for("carol", "not for bob").await.unwrap();

    assert_eq!(bob.render_message(&good).await.unwrap(), "readable");
    let not_base64 =
        r#"{"encryptedMessage":"%%%","encryptedSymKey":"AA==","iv":"AA=="}"#.to_string();
    assert!(matches!(
        bob.decrypt_message(&not_base64).await,
        Err(ClientError::Crypto(CryptoError::MalformedInput(_)))
    ));

    for unreadable in [
        tamper(&good),
        for_carol,
        not_base64,
        "{}".to_string(),
        "garbage".to_string(),
    ] {
        assert_eq!(
            bob.render_message(&unreadable).await.unwrap(),
            DEFAULT_DECRYPT_PLACEHOLDER
        );
    }
}

#[tokio::test]
async fn decrypt_keeps_typed_errors() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "hello").await.unwrap();

    let err = bob.decrypt_message(&tamper(&envelope)).await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::Decryption(_))));

    let err = bob.decrypt_message("{}").await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::MalformedEnvelope(_))));
}

#[tokio::test]
async fn custom_placeholder() {
    let directory = Arc::new(MemoryDirectory::new());
    let config = ClientConfig {
        decrypt_placeholder: "🔒 unreadable".to_string(),
        ..ClientConfig::default()
    };
    let bob = device_with(config, &directory);
    bob.register("bob").await.unwrap();
    assert_eq!(bob.render_message("{}").await.unwrap(), "🔒 unreadable");
}

#[tokio::test]
async fn conversation_renders_in_order_with_bad_message_isolated() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();

    let mut envelopes = Vec::new();
    for i in 0..10 {
        envelopes.push(alice.encrypt_for("bob", &format!("message {i}")).await.unwrap());
    }
    envelopes[4] = tamper(&envelopes[4]);

    let rendered = bob.render_conversation(&envelopes).await;
    assert_eq!(rendered.len(), 10);
    for (i, result) in rendered.into_iter().enumerate() {
        let text = result.unwrap();
        if i == 4 {
            assert_eq!(text, DEFAULT_DECRYPT_PLACEHOLDER);
        } else {
            assert_eq!(text, format!("message {i}"));
        }
    }
}

#[tokio::test]
async fn repeated_decrypt_hits_cache() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "cache me").await.unwrap();

    assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "cache me");
    assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "cache me");
    assert_eq!(bob.cache().len().await, 1);
}

#[tokio::test]
async fn cleared_key_is_not_bypassed_by_cache() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "cache me").await.unwrap();
    bob.decrypt_message(&envelope).await.unwrap();

    bob.keystore().clear_private_key().unwrap();
    let err = bob.decrypt_message(&envelope).await.unwrap_err();
    assert!(err.is_key_not_found());
}

#[tokio::test]
async fn replaced_key_is_not_bypassed_by_cache() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "hello").await.unwrap();
    assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "hello");

    bob.register("bob2").await.unwrap();
    let err = bob.decrypt_message(&envelope).await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::Decryption(_))));
}

#[tokio::test]
async fn key_replaced_through_keystore_is_not_bypassed_by_cache() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "hello").await.unwrap();
    bob.decrypt_message(&envelope).await.unwrap();

    let other = sealchat_crypto::generate_key_pair().unwrap();
    bob.keystore()
        .persist_private_key(&other.private_key_text())
        .unwrap();
    let err = bob.decrypt_message(&envelope).await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::Decryption(_))));
}

#[tokio::test]
async fn failures_are_not_cached() {
    let directory = Arc::new(MemoryDirectory::new());
    let bob = device(&directory);
    bob.register("bob").await.unwrap();

    assert!(bob.render_message("{}").await.is_ok());
    assert!(bob.cache().is_empty().await);
}

#[tokio::test]
async fn logout_retains_key_by_default() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "after re-login").await.unwrap();
    bob.decrypt_message(&envelope).await.unwrap();

    bob.logout().await.unwrap();

    assert!(bob.cache().is_empty().await);
    assert!(bob.keystore().has_private_key().unwrap());
    assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "after re-login");
}

#[tokio::test]
async fn logout_delete_policy_wipes_key() {
    let directory = Arc::new(MemoryDirectory::new());
    let config = ClientConfig {
        logout_policy: LogoutKeyPolicy::Delete,
        ..ClientConfig::default()
    };
    let alice = device(&directory);
    let bob = device_with(config, &directory);
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "gone").await.unwrap();

    bob.logout().await.unwrap();

    assert!(!bob.keystore().has_private_key().unwrap());
    assert!(bob.decrypt_message(&envelope).await.unwrap_err().is_key_not_found());
}

#[tokio::test]
async fn file_backed_device_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let directory = Arc::new(MemoryDirectory::new());
    let config = ClientConfig {
        key_storage_path: Some(dir.path().join("keys.json")),
        ..ClientConfig::default()
    };

    let alice = device(&directory);
    device_with(config.clone(), &directory)
        .register("bob")
        .await
        .unwrap();
    let envelope = alice.encrypt_for("bob", "persisted").await.unwrap();

    let restarted = device_with(config, &directory);
    assert_eq!(restarted.decrypt_message(&envelope).await.unwrap(), "persisted");
}

#[tokio::test]
async fn passphrase_protected_device() {
    let dir = tempfile::tempdir().unwrap();
    let directory = Arc::new(MemoryDirectory::new());
    let config = ClientConfig {
        key_storage_path: Some(dir.path().join("keys.json")),
        passphrase_protection: true,
        kdf: KdfParams::insecure_fast(),
        ..ClientConfig::default()
    };

    let missing = Messenger::from_config(config.clone(), None, directory.clone());
    assert!(matches!(missing, Err(ClientError::Config(_))));

    let unprotected = ClientConfig {
        passphrase_protection: false,
        ..config.clone()
    };
    let unused = Messenger::from_config(unprotected, Some("open sesame"), directory.clone());
    assert!(matches!(unused, Err(ClientError::Config(_))));

    let alice = device(&directory);
    let bob = Messenger::from_config(config.clone(), Some("open sesame"), directory.clone()).unwrap();
    bob.register("bob").await.unwrap();
    let envelope = alice.encrypt_for("bob", "locked up").await.unwrap();

    let wrong = Messenger::from_config(config, Some("wrong"), directory.clone()).unwrap();
    let err = wrong.decrypt_message(&envelope).await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::InvalidPassphrase)));

    assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), "locked up");
}

#[tokio::test]
async fn encrypt_to_invalid_key() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let err = alice.encrypt_message("hi", "bm90IGEga2V5").await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(CryptoError::InvalidKey(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_and_receives() {
    let directory = Arc::new(MemoryDirectory::new());
    let alice = device(&directory);
    let bob = device(&directory);
    bob.register("bob").await.unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let alice = alice.clone();
            let bob = bob.clone();
            tokio::spawn(async move {
                let text = format!("parallel {i}");
                let envelope = alice.encrypt_for("bob", &text).await.unwrap();
                assert_eq!(bob.decrypt_message(&envelope).await.unwrap(), text);
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }
}
