//! Key-value store trait definition.

use crate::error::{StorageError, StorageResult};

/// A durable store of named byte slots.
///
/// Stores are **opaque**: they hold whatever bytes the engine hands them and
/// return them unchanged. The sync engine keeps one slot for the operation
/// queue and one for the sync status registry.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `store`
/// - A failed `store` leaves the previous value readable
/// - `remove` on a missing slot is not an error
/// - Stores must be `Send + Sync` for shared access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait KeyValueStore: Send + Sync {
    /// Reads the slot named `key`.
    ///
    /// Returns `None` if the slot has never been written or was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the slot named `key` with `value`.
    ///
    /// After this returns successfully the value survives process termination
    /// (for durable implementations).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails.
    fn store(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Deletes the slot named `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the delete fails.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Returns the names of all stored slots, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the slots cannot be listed.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Checks that a slot key is usable by every store implementation.
///
/// Keys are non-empty, at most 128 bytes, and limited to ASCII letters,
/// digits, `_`, `-` and `.` (not starting with `.`), so they map directly to
/// file names.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] describing the first violation.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let reject = |reason| {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason,
        })
    };

    if key.is_empty() {
        return reject("key is empty");
    }
    if key.len() > 128 {
        return reject("key is longer than 128 bytes");
    }
    if key.starts_with('.') {
        return reject("key starts with a dot");
    }
    if key.contains('/') || key.contains('\\') {
        return reject("contains a path separator");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return reject("contains unsupported characters");
    }
    Ok(())
}
