//! JSON-file key/value store.

use crate::error::{StorageError, StorageResult};
use sealchat_crypto::{CryptoResult, SecretStorage};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

/// File-backed [`SecretStorage`].
///
/// The whole document is rewritten on every change: contents go to a
/// sibling temp file which is then renamed over the original, so a crash
/// leaves either the old or the new document, never a torn one. Concurrent
/// writers in one process are serialized; across processes the last rename
/// wins.
pub struct FileStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Opens the store at `path`. The file is created on first write.
    ///
    /// An existing file that is not a JSON object of strings is rejected
    /// up front rather than silently overwritten later.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let store = Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        };
        store.read_entries()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the value for `key`, if any.
    pub fn load(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.read_entries()?.remove(key))
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn store(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    /// Removes `key`. Removing a missing key is not an error.
    pub fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }

    /// Sibling path the next document is written to before the rename.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn read_entries(&self) -> StorageResult<BTreeMap<String, String>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => Zeroizing::new(c),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&contents).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let io_err = |source: std::io::Error| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let contents = Zeroizing::new(serde_json::to_vec_pretty(entries).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?);

        let tmp_path = self.temp_path();
        let mut file = open_private(&tmp_path).map_err(io_err)?;
        file.write_all(&contents).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;

        debug!(path = %self.path.display(), entries = entries.len(), "wrote key storage file");
        Ok(())
    }
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

impl SecretStorage for FileStorage {
    fn get(&self, key: &str) -> CryptoResult<Option<String>> {
        Ok(self.load(key)?)
    }

    fn set(&self, key: &str, value: &str) -> CryptoResult<()> {
        Ok(self.store(key, value)?)
    }

    fn remove(&self, key: &str) -> CryptoResult<()> {
        Ok(self.delete(key)?)
    }
}
