//! Interfaces implemented by the host around the platform provisioning flow.

use thiserror::Error;

use super::types::{EncryptedPassData, ProvisioningRequest, SessionSnapshot};

/// Errors reported by the host's provisioning flow.
#[derive(Debug, Error, uniffi::Error)]
pub enum PlatformError {
    /// The platform refused the request (policy, unsupported card, ...).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The capability is not available on this device.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The user dismissed the flow.
    #[error("cancelled")]
    Cancelled,

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for PlatformError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Result reported when the platform flow finishes.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum PlatformOutcome {
    /// The pass was added to Wallet.
    Added,
    /// The user dismissed the flow.
    Cancelled,
    /// The platform reported an error.
    Failed {
        /// Platform description, already stripped of native error objects.
        message: String,
    },
}

/// Host side of the add-payment-pass flow (`PKAddPaymentPassViewController`
/// on iOS).
///
/// The host forwards its delegate callbacks to the gateway:
/// `generateRequestWithCertificateChain` becomes
/// [`CommandGateway::deliver_challenge`](crate::CommandGateway::deliver_challenge)
/// and `didFinishAddingPaymentPass` becomes
/// [`CommandGateway::platform_did_finish`](crate::CommandGateway::platform_did_finish).
#[uniffi::export(with_foreign)]
pub trait ProvisioningPlatform: Send + Sync {
    /// Presents the provisioning UI for `request`, tagged with `session_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow cannot be presented.
    fn present_add_payment_pass(
        &self,
        session_id: String,
        request: ProvisioningRequest,
    ) -> Result<(), PlatformError>;

    /// Answers the pending challenge. `None` tells the platform no data is
    /// coming so it can show its own failure UI instead of waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses the payload.
    fn finish_add_payment_pass_request(
        &self,
        session_id: String,
        data: Option<EncryptedPassData>,
    ) -> Result<(), PlatformError>;

    /// Dismisses the provisioning UI after a caller-side cancellation.
    fn dismiss_add_payment_pass(&self, session_id: String);
}

/// Receives session state changes.
#[uniffi::export(with_foreign)]
pub trait ProvisioningListener: Send + Sync {
    /// Called after every state transition, outside any internal lock.
    fn on_provisioning_event(&self, snapshot: SessionSnapshot);
}
