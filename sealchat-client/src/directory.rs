//! User directory: where public keys are published and looked up.
//!
//! The directory is untrusted storage. It only ever sees public keys.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Remote registry of usernames and their public keys.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Registers `username` with its base64 SPKI public key.
    ///
    /// Fails with [`ClientError::UsernameTaken`] if the name is in use.
    async fn register(&self, username: &str, public_key: &str) -> ClientResult<()>;

    /// Returns the published public key for `username`.
    async fn get_public_key(&self, username: &str) -> ClientResult<String>;
}

/// In-process directory, for tests and local demos.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, String>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn register(&self, username: &str, public_key: &str) -> ClientResult<()> {
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return Err(ClientError::UsernameTaken(username.to_string()));
        }
        users.insert(username.to_string(), public_key.to_string());
        Ok(())
    }

    async fn get_public_key(&self, username: &str) -> ClientResult<String> {
        self.users
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| ClientError::UserNotFound(username.to_string()))
    }
}
