//! Durable device-local storage for sealchat.
//!
//! Backs the key store's private-key slot with a small JSON document on
//! disk, the native counterpart of browser local storage. Only string values
//! are stored and every write replaces the file atomically.

mod error;
mod file_store;

pub use error::{StorageError, StorageResult};
pub use file_store::FileStorage;
