use std::sync::Arc;

use crate::eligibility::PassLibrary;
use crate::keychain::Keychain;
use crate::provisioning::ProvisioningPlatform;
use crate::status_cache::StatusStore;

/// Bundles the host implementations a gateway or extension needs.
#[uniffi::export(with_foreign)]
pub trait PlatformProvider: Send + Sync {
    /// Returns the pass library used for eligibility checks.
    fn pass_library(&self) -> Arc<dyn PassLibrary>;

    /// Returns the add-payment-pass flow.
    fn provisioning(&self) -> Arc<dyn ProvisioningPlatform>;

    /// Returns the store shared with the Wallet extension.
    fn status_store(&self) -> Arc<dyn StatusStore>;

    /// Returns the keychain that receives card payloads.
    fn keychain(&self) -> Arc<dyn Keychain>;
}
