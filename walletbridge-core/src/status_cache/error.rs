//! Error types for the status cache and keychain sink.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by status stores and the keychain.
#[derive(Debug, Error, uniffi::Error)]
pub enum StorageError {
    /// Keys must be non-empty and free of control characters.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Errors coming from the backing store.
    #[error("store error: {0}")]
    Store(String),

    /// Errors coming from the cross-process lock.
    #[error("status lock error: {0}")]
    Lock(String),

    /// The persisted document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Errors coming from the platform keychain.
    #[error("keychain error: {0}")]
    Keychain(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for StorageError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
