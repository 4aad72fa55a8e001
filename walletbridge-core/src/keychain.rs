//! Keychain sink for the card payload handed over by `saveCardsToKeychain`.

use std::sync::Arc;

use serde_json::Value;

use crate::status_cache::{StorageError, StorageResult};

/// Keychain service under which the card payload is stored.
pub const CARDS_SERVICE: &str = "walletbridge.cards";
/// Keychain account under which the card payload is stored.
pub const CARDS_ACCOUNT: &str = "cards";

/// Secure item storage provided by the host.
///
/// iOS implementations should use a generic password item in the shared
/// keychain access group so the issuer extension can read it.
#[uniffi::export(with_foreign)]
pub trait Keychain: Send + Sync {
    /// Stores `data` for `service` / `account`, replacing any previous item.
    ///
    /// # Errors
    ///
    /// Returns an error if the keychain refuses the write.
    fn save_item(&self, service: String, account: String, data: Vec<u8>) -> StorageResult<()>;
}

/// Serializes the opaque card payload and stores it in the keychain.
///
/// The payload is treated as opaque: it is not inspected beyond rejecting
/// `null`, and its contents are never logged.
///
/// # Errors
///
/// Returns a keychain error for a `null` payload or when the write fails.
pub fn save_cards(keychain: &Arc<dyn Keychain>, payload: &Value) -> StorageResult<()> {
    if payload.is_null() {
        return Err(StorageError::Keychain(
            "refusing to store an empty card payload".to_string(),
        ));
    }
    let bytes = serde_json::to_vec(payload)?;
    log::debug!("saving {} byte card payload to keychain", bytes.len());
    keychain.save_item(CARDS_SERVICE.to_string(), CARDS_ACCOUNT.to_string(), bytes)
}
