//! In-memory key-value store for testing.

use crate::backend::{validate_key, KeyValueStore};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory key-value store.
///
/// This store keeps all slots in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Devices that don't need the queue to survive a restart
///
/// It can also be told to reject writes, which lets tests exercise the
/// engine's persistence-failure paths.
///
/// # Example
///
/// ```rust
/// use tillsync_storage::{KeyValueStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.store("sync_status", b"{}").unwrap();
/// assert_eq!(store.keys().unwrap(), vec!["sync_status".to_string()]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    slots: RwLock<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with a pre-populated slot.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_slot(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        store.slots.write().insert(key.into(), value.into());
        store
    }

    /// Makes every subsequent `store` and `remove` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns a copy of a slot without key validation.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn slot(&self, key: &str) -> Option<Vec<u8>> {
        self.slots.read().get(key).cloned()
    }

    /// Removes every slot.
    pub fn clear(&self) {
        self.slots.write().clear();
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("writes disabled")));
        }
        Ok(())
    }
}

impl KeyValueStore for InMemoryStore {
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        Ok(self.slots.read().get(key).cloned())
    }

    fn store(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.slots.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        self.slots.write().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.slots.read().keys().cloned().collect())
    }
}
