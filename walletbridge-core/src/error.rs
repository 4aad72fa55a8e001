use thiserror::Error;

use crate::provisioning::{CardDataError, PlatformError};
use crate::status_cache::StorageError;

/// Failure categories reported back to the calling environment.
///
/// Every error resolved on a command callback carries exactly one of these
/// kinds. Raw platform or transport errors are always translated into one of
/// them before crossing the bridge boundary.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    uniffi::Enum,
    strum::Display,
    strum::AsRefStr,
)]
pub enum ErrorKind {
    /// The command name is not part of the bridge surface.
    UnsupportedOperation,
    /// A required argument is missing or malformed.
    InvalidArgument,
    /// A provisioning session is already active.
    AlreadyInProgress,
    /// The operation was invoked out of sequence.
    InvalidState,
    /// The platform denied the request by policy.
    PlatformRejected,
    /// The card-data service failed or timed out.
    ExternalServiceFailure,
    /// The user dismissed the provisioning flow.
    UserCancelled,
    /// The status cache or keychain could not be read or written.
    StorageFailure,
    /// The command could not be resolved normally.
    Internal,
}

/// Error outputs from `WalletBridge`
#[derive(Debug, Error, Clone, PartialEq, Eq, uniffi::Error)]
pub enum BridgeError {
    /// The command name is not part of the bridge surface
    #[error("unsupported_operation: {0}")]
    UnsupportedOperation(String),
    /// The presented input is not valid for the requested operation
    #[error("invalid_argument: {0}")]
    InvalidArgument(String),
    /// Another provisioning session is already active
    #[error("already_in_progress: session {session_id} is still active")]
    AlreadyInProgress {
        /// Identifier of the session holding the slot.
        session_id: String,
    },
    /// The operation is not valid in the current session state
    #[error("invalid_state: {0}")]
    InvalidState(String),
    /// The platform refused the request
    #[error("platform_rejected: {0}")]
    PlatformRejected(String),
    /// The external card-data service failed
    #[error("external_service_failure: {0}")]
    ExternalServiceFailure(String),
    /// The user cancelled the provisioning flow
    #[error("user_cancelled")]
    UserCancelled,
    /// Persisted state could not be accessed
    #[error("storage_failure: {0}")]
    StorageFailure(String),
    /// Unexpected internal failure
    #[error("internal: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Returns the category reported to the caller for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::AlreadyInProgress { .. } => ErrorKind::AlreadyInProgress,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::PlatformRejected(_) => ErrorKind::PlatformRejected,
            Self::ExternalServiceFailure(_) => ErrorKind::ExternalServiceFailure,
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::StorageFailure(_) => ErrorKind::StorageFailure,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rebuilds an error from a kind and a human readable message.
    #[must_use]
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::UnsupportedOperation => Self::UnsupportedOperation(message),
            ErrorKind::InvalidArgument => Self::InvalidArgument(message),
            ErrorKind::AlreadyInProgress => Self::AlreadyInProgress {
                session_id: message,
            },
            ErrorKind::InvalidState => Self::InvalidState(message),
            ErrorKind::PlatformRejected => Self::PlatformRejected(message),
            ErrorKind::ExternalServiceFailure => Self::ExternalServiceFailure(message),
            ErrorKind::UserCancelled => Self::UserCancelled,
            ErrorKind::StorageFailure => Self::StorageFailure(message),
            ErrorKind::Internal => Self::Internal(message),
        }
    }
}

impl From<StorageError> for BridgeError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidKey(key) => {
                Self::InvalidArgument(format!("invalid status key: {key:?}"))
            }
            other => Self::StorageFailure(other.to_string()),
        }
    }
}

impl From<PlatformError> for BridgeError {
    fn from(error: PlatformError) -> Self {
        match error {
            PlatformError::Cancelled => Self::UserCancelled,
            PlatformError::Rejected(reason) | PlatformError::Unavailable(reason) => {
                Self::PlatformRejected(reason)
            }
            PlatformError::UnexpectedUniFFICallbackError(reason) => {
                Self::PlatformRejected(format!("platform callback failed: {reason}"))
            }
        }
    }
}

impl From<CardDataError> for BridgeError {
    fn from(error: CardDataError) -> Self {
        Self::ExternalServiceFailure(error.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidArgument(error.to_string())
    }
}
