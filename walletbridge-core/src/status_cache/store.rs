//! Platform interface for the shared status store.

use super::error::StorageResult;

/// Durable key/value store shared between the app and its extensions.
///
/// On iOS this is typically backed by the app group's `UserDefaults` suite;
/// [`FileStatusStore`](super::FileStatusStore) is the portable default.
///
/// Entries are independent: a write to one key must never lose a concurrent
/// write to another key, but no ordering across keys is required. The last
/// writer of a given key wins.
#[uniffi::export(with_foreign)]
pub trait StatusStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn read(&self, key: String) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write(&self, key: String, value: String) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only for actual I/O failures.
    fn remove(&self, key: String) -> StorageResult<()>;

    /// Removes every entry. Succeeds on an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error only for actual I/O failures.
    fn remove_all(&self) -> StorageResult<()>;
}
