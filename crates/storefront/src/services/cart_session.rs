//! Session-backed cart storage.
//!
//! The visitor's session plays the role the browser's `localStorage` plays
//! for the static site: a per-visitor string key-value store. Session access
//! is async, while [`KeyValueStore`] is synchronous, so each request works on
//! a [`SessionStorage`] snapshot:
//!
//! 1. [`SessionStorage::load`] copies the cart key out of the session
//! 2. the cart operation runs against the snapshot
//! 3. [`SessionStorage::flush`] writes back only the keys that changed

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dsi_core::storage::entry_size;
use dsi_core::{KeyValueStore, StorageError};
use serde_json::Value;
use tower_sessions::Session;

/// Snapshot of selected session keys, usable as a [`KeyValueStore`].
#[derive(Debug)]
pub struct SessionStorage {
    inner: Mutex<Snapshot>,
    quota: usize,
}

#[derive(Debug, Default)]
struct Snapshot {
    values: HashMap<String, String>,
    dirty: HashSet<String>,
}

impl SessionStorage {
    /// Copy `keys` out of the session.
    ///
    /// Values that were not stored as strings are kept as their JSON text, so
    /// the cart's own validation decides what to do with them.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store cannot be read.
    pub async fn load(
        session: &Session,
        keys: &[&str],
        quota: usize,
    ) -> Result<Self, tower_sessions::session::Error> {
        let mut values = HashMap::new();
        for key in keys {
            if let Some(value) = session.get_value(key).await? {
                values.insert((*key).to_string(), value_to_text(value));
            }
        }

        Ok(Self::from_values(values, quota))
    }

    /// Build a snapshot from already-loaded values.
    #[must_use]
    pub fn from_values(values: HashMap<String, String>, quota: usize) -> Self {
        Self {
            inner: Mutex::new(Snapshot {
                values,
                dirty: HashSet::new(),
            }),
            quota,
        }
    }

    /// Keys written or removed since the snapshot was taken.
    #[must_use]
    pub fn changed_keys(&self) -> Vec<String> {
        let snapshot = self.lock_or_recover();
        let mut keys: Vec<String> = snapshot.dirty.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Write changed keys back to the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the session store cannot be written.
    pub async fn flush(self, session: &Session) -> Result<(), tower_sessions::session::Error> {
        let snapshot = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);

        for key in snapshot.dirty {
            match snapshot.values.get(&key) {
                Some(value) => session.insert(&key, value).await?,
                None => {
                    session.remove_value(&key).await?;
                }
            }
        }

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Snapshot>, StorageError> {
        self.inner
            .lock()
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    fn lock_or_recover(&self) -> MutexGuard<'_, Snapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for SessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut snapshot = self.lock()?;

        let others: usize = snapshot
            .values
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| entry_size(k, v))
            .sum();
        let needed = others + entry_size(key, value);
        if needed > self.quota {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed,
                quota: self.quota,
            });
        }

        snapshot.values.insert(key.to_string(), value.to_string());
        snapshot.dirty.insert(key.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut snapshot = self.lock()?;
        // Removing an absent key must not mark the session modified.
        if snapshot.values.remove(key).is_some() {
            snapshot.dirty.insert(key.to_string());
        }
        Ok(())
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
