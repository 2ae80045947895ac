//! Key-value persistence adapters.
//!
//! The cart never talks to a concrete backend. It is handed something that
//! implements [`KeyValueStore`]: string keys mapping to string blobs, the same
//! shape as the browser's `localStorage`.
//!
//! # Implementations
//!
//! - [`MemoryStore`] - in-process map with an optional byte quota
//! - `Arc<T>` and `&T` forward to `T`, so one store can back several handles

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

/// Errors raised by a persistence backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Writing the value would exceed the backend's storage budget.
    #[error("storage quota exceeded writing {key}: need {needed} bytes, quota is {quota}")]
    QuotaExceeded {
        /// Key being written.
        key: String,
        /// Total bytes the store would hold after the write.
        needed: usize,
        /// Maximum bytes the store may hold.
        quota: usize,
    },

    /// The backend could not be reached or is in an unusable state.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The value could not be encoded for storage.
    #[error("failed to encode value: {0}")]
    Encoding(String),
}

/// Synchronous string key-value storage.
///
/// Methods take `&self`; implementations that mutate use interior mutability
/// so a single store can be shared between independently created handles.
pub trait KeyValueStore {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::QuotaExceeded` if the write does not fit.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Byte size of one stored entry, counted the way browsers budget storage.
#[must_use]
pub fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// Thread-safe in-memory [`KeyValueStore`].
///
/// ```
/// use dsi_core::{KeyValueStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.set("greeting", "hola").unwrap();
/// assert_eq!(store.get("greeting").unwrap().as_deref(), Some("hola"));
///
/// store.remove("greeting").unwrap();
/// assert!(store.get("greeting").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create an empty store with no quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that holds at most `quota` bytes of keys and values.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    /// Whether `key` currently has a value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` if the store's lock is poisoned.
    pub fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock()?.contains_key(key))
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.lock()?;

        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let needed = others + entry_size(key, value);
            if needed > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota,
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.get("carrito").unwrap(), None);
    }

    #[test]
    fn test_set_replaces_value() {
        let store = MemoryStore::new();
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("nothing").is_ok());
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let store = MemoryStore::with_quota(10);
        let err = store.set("key", "0123456789").unwrap_err();
        assert_eq!(
            err,
            StorageError::QuotaExceeded {
                key: "key".to_string(),
                needed: 13,
                quota: 10,
            }
        );
        assert!(!store.contains("key").unwrap());
    }

    #[test]
    fn test_quota_ignores_value_being_replaced() {
        let store = MemoryStore::with_quota(8);
        store.set("k", "1234567").unwrap();
        // Replacing the same key must not double count the old value.
        store.set("k", "7654321").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("7654321"));
    }

    #[test]
    fn test_arc_forwards_to_shared_store() {
        let shared = Arc::new(MemoryStore::new());
        let handle = Arc::clone(&shared);
        handle.set("k", "v").unwrap();
        assert_eq!(shared.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_quota_error_display() {
        let err = StorageError::QuotaExceeded {
            key: "carrito".to_string(),
            needed: 20,
            quota: 10,
        };
        assert_eq!(
            err.to_string(),
            "storage quota exceeded writing carrito: need 20 bytes, quota is 10"
        );
    }
}
