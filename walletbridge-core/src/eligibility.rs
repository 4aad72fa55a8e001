//! Read-only checks against the local and paired-device pass libraries.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::BridgeError;
use crate::provisioning::PlatformError;
use crate::runtime::bounded_blocking;

/// A payment pass already present in a pass library.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PaymentPassInfo {
    /// Issuer account identifier of the pass.
    pub primary_account_identifier: String,
    /// Last digits of the card number as shown by Wallet.
    pub primary_account_number_suffix: String,
}

/// Host view of the platform pass library (`PKPassLibrary` on iOS).
///
/// Calls are synchronous; the prober runs them on the blocking pool and
/// bounds each one with the platform query timeout.
#[uniffi::export(with_foreign)]
pub trait PassLibrary: Send + Sync {
    /// Whether the pass library exists on this device.
    fn is_pass_library_available(&self) -> bool;

    /// Whether the device may add payment passes at all.
    fn can_add_payment_pass(&self) -> bool;

    /// Whether a paired device (watch) with a pass library is reachable.
    fn is_remote_pass_library_available(&self) -> bool;

    /// Payment passes provisioned on this device.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform refuses the query.
    fn local_payment_passes(&self) -> Result<Vec<PaymentPassInfo>, PlatformError>;

    /// Payment passes provisioned on paired devices.
    ///
    /// # Errors
    ///
    /// Returns an error when the platform refuses the query.
    fn remote_payment_passes(&self) -> Result<Vec<PaymentPassInfo>, PlatformError>;
}

/// Why a card is not eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, uniffi::Enum)]
pub enum EligibilityReason {
    /// A matching pass is already in the library.
    AlreadyProvisioned,
    /// The device cannot add payment passes.
    NotSupported,
    /// No paired device is reachable.
    DeviceNotPaired,
    /// The platform refused to answer.
    Unknown,
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, uniffi::Record)]
pub struct EligibilityResult {
    /// `true` when the card may be added.
    pub eligible: bool,
    /// Set only when `eligible` is `false`.
    pub reason: Option<EligibilityReason>,
}

impl EligibilityResult {
    /// An eligible card.
    #[must_use]
    pub const fn eligible() -> Self {
        Self {
            eligible: true,
            reason: None,
        }
    }

    /// An ineligible card with its reason.
    #[must_use]
    pub const fn ineligible(reason: EligibilityReason) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
        }
    }
}

/// How a card is matched against existing passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    /// Exact issuer account identifier.
    PrimaryAccountIdentifier(String),
    /// Last four digits; longer masked numbers are reduced to their tail.
    Suffix(String),
}

impl LookupKey {
    /// Validates and normalizes a caller-supplied key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a blank key.
    pub fn normalized(self) -> Result<Self, BridgeError> {
        match self {
            Self::PrimaryAccountIdentifier(id) => {
                let id = id.trim();
                if id.is_empty() {
                    return Err(BridgeError::InvalidArgument(
                        "primaryAccountIdentifier must not be empty".to_string(),
                    ));
                }
                Ok(Self::PrimaryAccountIdentifier(id.to_string()))
            }
            Self::Suffix(suffix) => {
                let suffix = last_four(&suffix);
                if suffix.is_empty() {
                    return Err(BridgeError::InvalidArgument(
                        "card suffix must not be empty".to_string(),
                    ));
                }
                Ok(Self::Suffix(suffix))
            }
        }
    }

    pub(crate) fn matches(&self, pass: &PaymentPassInfo) -> bool {
        match self {
            Self::PrimaryAccountIdentifier(id) => pass.primary_account_identifier == *id,
            Self::Suffix(suffix) => last_four(&pass.primary_account_number_suffix) == *suffix,
        }
    }
}

/// Last four characters of a masked card number, ignoring whitespace.
pub(crate) fn last_four(masked: &str) -> String {
    let chars: Vec<char> = masked.chars().filter(|c| !c.is_whitespace()).collect();
    chars[chars.len().saturating_sub(4)..].iter().collect()
}

/// Classifies `key` against the passes a library reported.
#[must_use]
pub fn evaluate(
    passes: Option<Result<Vec<PaymentPassInfo>, PlatformError>>,
    key: &LookupKey,
) -> EligibilityResult {
    match passes {
        Some(Ok(passes)) if passes.iter().any(|p| key.matches(p)) => {
            EligibilityResult::ineligible(EligibilityReason::AlreadyProvisioned)
        }
        Some(Ok(_)) => EligibilityResult::eligible(),
        Some(Err(e)) => {
            log::warn!("pass library refused the query: {e}");
            EligibilityResult::ineligible(EligibilityReason::Unknown)
        }
        None => EligibilityResult::ineligible(EligibilityReason::Unknown),
    }
}

/// Answers wallet availability and card eligibility questions.
#[derive(Clone)]
pub struct EligibilityProber {
    library: Arc<dyn PassLibrary>,
    timeout: Duration,
}

impl std::fmt::Debug for EligibilityProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EligibilityProber")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl EligibilityProber {
    /// Creates a prober bounding each platform query by `timeout`.
    #[must_use]
    pub fn new(library: Arc<dyn PassLibrary>, timeout: Duration) -> Self {
        Self { library, timeout }
    }

    async fn query<T, F>(&self, what: &str, call: F) -> Result<Option<T>, BridgeError>
    where
        F: FnOnce(&dyn PassLibrary) -> T + Send + 'static,
        T: Send + 'static,
    {
        let library = Arc::clone(&self.library);
        bounded_blocking(self.timeout, what, move || call(library.as_ref())).await
    }

    /// Pass library available and the device able to add payment passes.
    ///
    /// A host that does not answer in time counts as unavailable.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the host call panicked.
    pub async fn is_wallet_available(&self) -> Result<bool, BridgeError> {
        let available = self
            .query("wallet availability", |library| {
                library.is_pass_library_available() && library.can_add_payment_pass()
            })
            .await?;
        Ok(available.unwrap_or(false))
    }

    /// Whether the card may be added to this device.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank key, `Internal` if a host call panicked.
    pub async fn check_card_eligibility(
        &self,
        key: LookupKey,
    ) -> Result<EligibilityResult, BridgeError> {
        let key = key.normalized()?;
        if !self.is_wallet_available().await? {
            return Ok(EligibilityResult::ineligible(EligibilityReason::NotSupported));
        }
        let passes = self
            .query("local pass lookup", |library| library.local_payment_passes())
            .await?;
        Ok(evaluate(passes, &key))
    }

    /// Whether the card may be added to a paired device.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank key, `Internal` if a host call panicked.
    pub async fn check_paired_device_eligibility(
        &self,
        key: LookupKey,
    ) -> Result<EligibilityResult, BridgeError> {
        let key = key.normalized()?;
        let paired = self
            .query("paired device lookup", |library| {
                library.is_remote_pass_library_available()
            })
            .await?
            .unwrap_or(false);
        if !paired {
            return Ok(EligibilityResult::ineligible(EligibilityReason::DeviceNotPaired));
        }
        let passes = self
            .query("remote pass lookup", |library| library.remote_payment_passes())
            .await?;
        Ok(evaluate(passes, &key))
    }

    /// Whether a paired device already holds a matching pass.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for a blank key, `Internal` if a host call panicked.
    pub async fn check_paired_devices(&self, key: LookupKey) -> Result<bool, BridgeError> {
        Ok(self.check_paired_device_eligibility(key).await?.reason
            == Some(EligibilityReason::AlreadyProvisioned))
    }

    /// Passes known to this device, or to paired devices when `remote`.
    ///
    /// A refused or unanswered query yields an empty list.
    pub(crate) async fn known_passes(
        &self,
        remote: bool,
    ) -> Result<Vec<PaymentPassInfo>, BridgeError> {
        let passes = if remote {
            self.query("remote pass lookup", |library| library.remote_payment_passes())
                .await?
        } else {
            self.query("local pass lookup", |library| library.local_payment_passes())
                .await?
        };
        match passes {
            Some(Ok(passes)) => Ok(passes),
            Some(Err(e)) => {
                log::warn!("pass library refused the query: {e}");
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct FakeLibrary {
        available: bool,
        remote: bool,
        local: Mutex<Result<Vec<PaymentPassInfo>, String>>,
        paired: Vec<PaymentPassInfo>,
        delay: Option<Duration>,
    }

    impl FakeLibrary {
        fn with_local(local: Vec<PaymentPassInfo>) -> Self {
            Self {
                available: true,
                remote: true,
                local: Mutex::new(Ok(local)),
                paired: Vec::new(),
                delay: None,
            }
        }
    }

    impl PassLibrary for FakeLibrary {
        fn is_pass_library_available(&self) -> bool {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.available
        }

        fn can_add_payment_pass(&self) -> bool {
            true
        }

        fn is_remote_pass_library_available(&self) -> bool {
            self.remote
        }

        fn local_payment_passes(&self) -> Result<Vec<PaymentPassInfo>, PlatformError> {
            self.local
                .lock()
                .unwrap()
                .clone()
                .map_err(PlatformError::Rejected)
        }

        fn remote_payment_passes(&self) -> Result<Vec<PaymentPassInfo>, PlatformError> {
            Ok(self.paired.clone())
        }
    }

    fn pass(id: &str, suffix: &str) -> PaymentPassInfo {
        PaymentPassInfo {
            primary_account_identifier: id.to_string(),
            primary_account_number_suffix: suffix.to_string(),
        }
    }

    fn prober(library: FakeLibrary) -> EligibilityProber {
        EligibilityProber::new(Arc::new(library), Duration::from_millis(200))
    }

    #[test]
    fn test_last_four() {
        assert_eq!(last_four("•••• •••• •••• 4321"), "4321");
        assert_eq!(last_four("12"), "12");
        assert_eq!(last_four(""), "");
    }

    #[tokio::test]
    async fn test_provisioned_card_is_not_eligible() {
        let prober = prober(FakeLibrary::with_local(vec![pass("acct-1", "1234")]));

        let by_id = prober
            .check_card_eligibility(LookupKey::PrimaryAccountIdentifier("acct-1".into()))
            .await
            .unwrap();
        assert_eq!(
            by_id,
            EligibilityResult::ineligible(EligibilityReason::AlreadyProvisioned)
        );

        let by_masked_suffix = prober
            .check_card_eligibility(LookupKey::Suffix("**** 1234".into()))
            .await
            .unwrap();
        assert_eq!(by_masked_suffix, by_id);

        let other = prober
            .check_card_eligibility(LookupKey::Suffix("9999".into()))
            .await
            .unwrap();
        assert_eq!(other, EligibilityResult::eligible());
    }

    #[tokio::test]
    async fn test_unavailable_wallet_is_not_supported() {
        let mut library = FakeLibrary::with_local(Vec::new());
        library.available = false;
        let result = prober(library)
            .check_card_eligibility(LookupKey::Suffix("1234".into()))
            .await
            .unwrap();
        assert_eq!(
            result,
            EligibilityResult::ineligible(EligibilityReason::NotSupported)
        );
    }

    #[tokio::test]
    async fn test_refused_query_is_unknown() {
        let library = FakeLibrary::with_local(Vec::new());
        *library.local.lock().unwrap() = Err("denied".to_string());
        let result = prober(library)
            .check_card_eligibility(LookupKey::Suffix("1234".into()))
            .await
            .unwrap();
        assert_eq!(result, EligibilityResult::ineligible(EligibilityReason::Unknown));
    }

    #[tokio::test]
    async fn test_paired_devices() {
        let mut library = FakeLibrary::with_local(Vec::new());
        library.paired = vec![pass("acct-2", "5678")];
        let paired = prober(library);

        assert!(paired
            .check_paired_devices(LookupKey::Suffix("5678".into()))
            .await
            .unwrap());
        assert!(!paired
            .check_paired_devices(LookupKey::PrimaryAccountIdentifier("acct-1".into()))
            .await
            .unwrap());

        let mut unpaired = FakeLibrary::with_local(Vec::new());
        unpaired.remote = false;
        let result = prober(unpaired)
            .check_paired_device_eligibility(LookupKey::Suffix("5678".into()))
            .await
            .unwrap();
        assert_eq!(
            result,
            EligibilityResult::ineligible(EligibilityReason::DeviceNotPaired)
        );
    }

    #[tokio::test]
    async fn test_blank_key_is_invalid() {
        let err = prober(FakeLibrary::with_local(Vec::new()))
            .check_card_eligibility(LookupKey::PrimaryAccountIdentifier("  ".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_slow_library_counts_as_unavailable() {
        let mut library = FakeLibrary::with_local(Vec::new());
        library.delay = Some(Duration::from_secs(1));
        assert!(!prober(library).is_wallet_available().await.unwrap());
    }
}
