//! Message pipeline for sealchat clients.
//!
//! Ties the encryption core to its collaborators:
//! - [`UserDirectory`] for publishing and looking up public keys
//! - a device key store built from [`ClientConfig`]
//! - a content-addressed [`DecryptCache`] so repeated renders are free
//!
//! The storage tier only ever receives envelope text and public keys.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod messenger;

pub use cache::DecryptCache;
pub use config::{ClientConfig, DEFAULT_DECRYPT_PLACEHOLDER, LogoutKeyPolicy};
pub use directory::{MemoryDirectory, UserDirectory};
pub use error::{ClientError, ClientResult};
pub use messenger::Messenger;
