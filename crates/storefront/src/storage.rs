//! Durable key-value storage port.
//!
//! The cart engine persists through [`KeyValueStorage`], a small synchronous
//! port shaped like browser local storage. Two adapters ship with the crate:
//!
//! - [`MemoryStorage`] - in-process map behind a shared handle, with an
//!   optional byte quota
//! - [`FileStorage`] - one `<key>.json` file per key under a data directory

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;

/// Errors raised by a storage adapter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would exceed the storage quota.
    #[error("Storage quota exceeded ({needed} bytes needed, {quota} available)")]
    QuotaExceeded {
        /// Total bytes the store would hold after the write.
        needed: usize,
        /// Configured quota in bytes.
        quota: usize,
    },
    /// The key contains characters the adapter cannot store.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    /// I/O error while reading or writing.
    #[error("Storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Synchronous key-value storage.
pub trait KeyValueStorage {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write every `(key, value)` pair as one unit.
    ///
    /// Either all pairs become visible or none of them do.
    ///
    /// # Errors
    ///
    /// Returns an error if the write is rejected or fails.
    fn commit(&mut self, writes: &[(&str, &str)]) -> Result<(), StorageError>;

    /// Remove every listed key. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be modified.
    fn remove(&mut self, keys: &[&str]) -> Result<(), StorageError>;
}

// =============================================================================
// MemoryStorage
// =============================================================================

/// In-process storage.
///
/// Clones share the same entries, so a test (or a second cart session) can
/// observe exactly what another handle wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    /// Create an empty, unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that rejects writes once keys and values
    /// together exceed `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Rc::default(),
            quota: Some(quota),
        }
    }

    /// Whether a value is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn used_bytes(entries: &BTreeMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn commit(&mut self, writes: &[(&str, &str)]) -> Result<(), StorageError> {
        let mut entries = self.entries.borrow_mut();

        if let Some(quota) = self.quota {
            let mut staged = entries.clone();
            for (key, value) in writes {
                staged.insert((*key).to_string(), (*value).to_string());
            }
            let needed = Self::used_bytes(&staged);
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
            *entries = staged;
            return Ok(());
        }

        for (key, value) in writes {
            entries.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<(), StorageError> {
        let mut entries = self.entries.borrow_mut();
        for key in keys {
            entries.remove(*key);
        }
        Ok(())
    }
}

// =============================================================================
// FileStorage
// =============================================================================

/// Store values as JSON files under a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base: PathBuf,
}

impl FileStorage {
    /// Create a store rooted at `base`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    /// Directory holding the stored files.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base.join(format!("{key}.json")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(path) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn commit(&mut self, writes: &[(&str, &str)]) -> Result<(), StorageError> {
        // Stage everything first so a failed write leaves the old values intact.
        let mut staged = Vec::with_capacity(writes.len());
        for (key, value) in writes {
            let path = self.path_for(key)?;
            let tmp = path.with_extension("json.tmp");
            if let Err(err) = fs::write(&tmp, value) {
                for (tmp, _) in &staged {
                    let _ = fs::remove_file(tmp);
                }
                let _ = fs::remove_file(&tmp);
                return Err(StorageError::Io(err));
            }
            staged.push((tmp, path));
        }

        // Renames happen in write order; callers put the key readers check
        // for completeness last. A failed rename restores what was replaced.
        let mut applied = Vec::with_capacity(staged.len());
        for (index, (tmp, path)) in staged.iter().enumerate() {
            let renamed = read_previous(path).and_then(|previous| {
                fs::rename(tmp, path)?;
                Ok(previous)
            });
            match renamed {
                Ok(previous) => applied.push((path, previous)),
                Err(err) => {
                    restore(&applied);
                    for (tmp, _) in staged.iter().skip(index) {
                        let _ = fs::remove_file(tmp);
                    }
                    return Err(StorageError::Io(err));
                }
            }
        }
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<(), StorageError> {
        for key in keys {
            let path = self.path_for(key)?;
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => return Err(StorageError::Io(err)),
            }
        }
        Ok(())
    }
}

fn read_previous(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// Put back the files replaced by a partially applied commit, newest first.
fn restore(applied: &[(&PathBuf, Option<Vec<u8>>)]) {
    for (path, previous) in applied.iter().rev() {
        let _ = match previous {
            Some(bytes) => fs::write(path, bytes),
            None => fs::remove_file(path),
        };
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_roundtrip() {
        let mut storage = MemoryStorage::new();
        storage.commit(&[("a", "1"), ("b", "2")]).unwrap();

        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.get("b").unwrap().as_deref(), Some("2"));
        assert_eq!(storage.get("c").unwrap(), None);
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn test_memory_storage_clones_share_entries() {
        let mut storage = MemoryStorage::new();
        let observer = storage.clone();

        storage.commit(&[("cart", "[]")]).unwrap();
        assert!(observer.contains("cart"));

        storage.remove(&["cart", "missing"]).unwrap();
        assert!(observer.is_empty());
    }

    #[test]
    fn test_memory_storage_quota_rejects_whole_commit() {
        let mut storage = MemoryStorage::with_quota(8);
        storage.commit(&[("k", "v")]).unwrap();

        let result = storage.commit(&[("a", "1"), ("big", "0123456789")]);
        assert!(matches!(result, Err(StorageError::QuotaExceeded { .. })));

        // Nothing from the rejected commit is visible.
        assert!(!storage.contains("a"));
        assert!(storage.contains("k"));
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("data")).unwrap();

        storage.commit(&[("cart", "[1]"), ("cart_ts", "42")]).unwrap();
        assert_eq!(storage.get("cart").unwrap().as_deref(), Some("[1]"));
        assert_eq!(storage.get("cart_ts").unwrap().as_deref(), Some("42"));
        assert!(storage.base().join("cart.json").exists());
        assert!(!storage.base().join("cart.json.tmp").exists());

        storage.remove(&["cart", "cart_ts", "never_written"]).unwrap();
        assert_eq!(storage.get("cart").unwrap(), None);
    }

    #[test]
    fn test_file_storage_failed_commit_keeps_previous_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        storage.commit(&[("cart", "[1]")]).unwrap();

        // A directory where the second file belongs makes its rename fail.
        fs::create_dir(storage.base().join("cart_ts.json")).unwrap();

        let result = storage.commit(&[("cart", "[2]"), ("cart_ts", "42")]);
        assert!(matches!(result, Err(StorageError::Io(_))));
        assert_eq!(storage.get("cart").unwrap().as_deref(), Some("[1]"));
        assert!(!storage.base().join("cart.json.tmp").exists());
        assert!(!storage.base().join("cart_ts.json.tmp").exists());
    }

    #[test]
    fn test_file_storage_failed_first_commit_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path()).unwrap();
        fs::create_dir(storage.base().join("cart_ts.json")).unwrap();

        assert!(storage.commit(&[("cart", "[2]"), ("cart_ts", "42")]).is_err());
        assert_eq!(storage.get("cart").unwrap(), None);
    }

    #[test]
    fn test_file_storage_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();

        assert!(matches!(
            storage.get("../escape"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.get(""), Err(StorageError::InvalidKey(_))));
    }
}
