//! Content-addressed cache of decrypted messages.
//!
//! Entries are keyed by the SHA-256 of the device key slot together with the
//! envelope text, so re-rendering the same message list never re-runs the
//! cipher, and replacing or deleting the key makes every entry unreachable.
//! Only successful decryptions are cached. Eviction is first-in first-out.

use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

/// Short identifier for an envelope, used in log events.
pub fn envelope_id(envelope_text: &str) -> String {
    hex::encode(Sha256::digest(envelope_text.as_bytes()))
}

/// Fingerprint of the raw private-key slot contents.
pub fn slot_fingerprint(slot: &str) -> String {
    hex::encode(Sha256::digest(slot.as_bytes()))
}

/// Cache key for an envelope decrypted under the key with `key_fingerprint`.
pub fn cache_key(key_fingerprint: &str, envelope_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key_fingerprint.as_bytes());
    hasher.update([0u8]);
    hasher.update(envelope_text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Default)]
struct Entries {
    plaintexts: HashMap<String, Zeroizing<String>>,
    order: VecDeque<String>,
}

/// Thread-safe bounded cache of envelope id -> plaintext.
#[derive(Clone)]
pub struct DecryptCache {
    inner: Arc<RwLock<Entries>>,
    capacity: usize,
}

impl DecryptCache {
    /// A cache holding at most `capacity` plaintexts. 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Entries::default())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn get(&self, id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .plaintexts
            .get(id)
            .map(|p| p.to_string())
    }

    pub async fn insert(&self, id: String, plaintext: String) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.inner.write().await;
        if entries.plaintexts.contains_key(&id) {
            return;
        }
        while entries.order.len() >= self.capacity {
            match entries.order.pop_front() {
                Some(oldest) => {
                    entries.plaintexts.remove(&oldest);
                }
                None => break,
            }
        }
        entries.order.push_back(id.clone());
        entries.plaintexts.insert(id, Zeroizing::new(plaintext));
    }

    /// Drops every cached plaintext.
    pub async fn clear(&self) {
        let mut entries = self.inner.write().await;
        entries.plaintexts.clear();
        entries.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.plaintexts.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.plaintexts.is_empty()
    }
}

impl Default for DecryptCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_id_is_sha256_hex() {
        assert_eq!(
            envelope_id(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn cache_key_depends_on_key_fingerprint() {
        let envelope = r#"{"encryptedMessage":"AA==","encryptedSymKey":"AA==","iv":"AA=="}"#;
        let a = cache_key(&slot_fingerprint("key a"), envelope);
        let b = cache_key(&slot_fingerprint("key b"), envelope);
        assert_ne!(a, b);
        assert_eq!(a, cache_key(&slot_fingerprint("key a"), envelope));
        assert_ne!(a, envelope_id(envelope));
    }

    #[tokio::test]
    async fn evicts_oldest_first() {
        let cache = DecryptCache::new(2);
        cache.insert("a".into(), "1".into()).await;
        cache.insert("b".into(), "2".into()).await;
        cache.insert("c".into(), "3".into()).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await.as_deref(), Some("2"));
        assert_eq!(cache.get("c").await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn reinsert_does_not_duplicate_order() {
        let cache = DecryptCache::new(2);
        cache.insert("a".into(), "1".into()).await;
        cache.insert("a".into(), "1".into()).await;
        cache.insert("b".into(), "2".into()).await;
        assert_eq!(cache.get("a").await.as_deref(), Some("1"));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn zero_capacity_disables() {
        let cache = DecryptCache::new(0);
        cache.insert("a".into(), "1".into()).await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn clear_empties() {
        let cache = DecryptCache::new(4);
        cache.insert("a".into(), "1".into()).await;
        cache.clear().await;
        assert!(cache.is_empty().await);
    }
}
