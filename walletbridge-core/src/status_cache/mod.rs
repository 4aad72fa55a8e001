//! Wallet status cache shared with the watch / issuer extension.
//!
//! The cache is a narrow layer over a platform [`StatusStore`]: it validates
//! keys, encodes typed values as JSON and offers the end-to-end probe used by
//! `testWalletExtension`. Entries are independent key/value pairs; the store
//! decides how they survive restarts and how processes share them.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

mod error;
mod file;
mod lock;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStatusStore;
pub use memory::MemoryStatusStore;
pub use store::StatusStore;

/// Key used by [`StatusCache::test_extension`].
pub const PROBE_KEY: &str = "walletbridge.extension.probe";

/// What a clear operation removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearScope {
    /// A single entry.
    Key(String),
    /// Every entry in the store.
    All,
}

/// Validated access to the shared status store.
#[derive(Clone)]
pub struct StatusCache {
    store: Arc<dyn StatusStore>,
}

impl std::fmt::Debug for StatusCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusCache").finish_non_exhaustive()
    }
}

impl StatusCache {
    /// Wraps a platform store.
    #[must_use]
    pub fn new(store: Arc<dyn StatusStore>) -> Self {
        Self { store }
    }

    /// Stores `value` under `key`; the last writer wins.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for an empty key or a store error.
    pub fn save(&self, key: &str, value: &str) -> StorageResult<()> {
        let key = validate_key(key)?;
        self.store.write(key.to_string(), value.to_string())
    }

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for an empty key or a store error.
    pub fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let key = validate_key(key)?;
        self.store.read(key.to_string())
    }

    /// Removes one entry or every entry. Clearing missing entries succeeds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKey` for an empty key or a store error.
    pub fn clear(&self, scope: ClearScope) -> StorageResult<()> {
        match scope {
            ClearScope::Key(key) => {
                let key = validate_key(&key)?;
                self.store.remove(key.to_string())
            }
            ClearScope::All => self.store.remove_all(),
        }
    }

    /// Round-trips a fresh value through save, get and clear on [`PROBE_KEY`].
    ///
    /// # Errors
    ///
    /// Returns a store error if any step fails or reads back the wrong value.
    pub fn test_extension(&self) -> StorageResult<()> {
        let token = uuid::Uuid::new_v4().to_string();
        self.save(PROBE_KEY, &token)?;

        let read_back = self.get(PROBE_KEY)?;
        if read_back.as_deref() != Some(token.as_str()) {
            let _ = self.clear(ClearScope::Key(PROBE_KEY.to_string()));
            return Err(StorageError::Store(
                "probe value did not round-trip".to_string(),
            ));
        }

        self.clear(ClearScope::Key(PROBE_KEY.to_string()))?;
        if self.get(PROBE_KEY)?.is_some() {
            return Err(StorageError::Store("probe value survived clear".to_string()));
        }
        Ok(())
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        self.get(key)?
            .map(|raw| serde_json::from_str(&raw).map_err(StorageError::from))
            .transpose()
    }

    pub(crate) fn save_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> StorageResult<()> {
        self.save(key, &serde_json::to_string(value)?)
    }
}

fn validate_key(key: &str) -> StorageResult<&str> {
    let trimmed = key.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(trimmed)
}
