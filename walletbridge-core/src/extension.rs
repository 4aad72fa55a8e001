//! Issuer provisioning extension support.
//!
//! The Wallet app runs the extension in its own process. It only sees what the
//! main app left in the shared status cache: the session token, whether the
//! user has eligible cards, the issuer base URL and the card list written by
//! `saveCardDetailsForExtension`.

use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::BridgeConfig;
use crate::eligibility::{last_four, EligibilityProber, LookupKey};
use crate::error::BridgeError;
use crate::provider::PlatformProvider;
use crate::provisioning::{
    CardDataService, EncryptedPassData, EncryptionScheme, HttpCardDataService,
    ProvisioningCertificateChallenge, ProvisioningRequest,
};
use crate::runtime::bounded_blocking;
use crate::status_cache::{StatusCache, StorageResult};

/// Cache key holding the app session token.
pub const SESSION_TOKEN_KEY: &str = "sessionToken";
/// Cache key holding whether the user has cards that can be added.
pub const HAS_ELIGIBLE_CARDS_KEY: &str = "hasEligibleCards";
/// Cache key holding the issuer base URL used to resolve card art.
pub const BASE_URL_KEY: &str = "baseURL";
/// Cache key holding the JSON card list.
pub const CARD_DETAILS_KEY: &str = "cardDetails";

/// Typed view over the well-known cache entries.
#[derive(Debug)]
pub struct WalletStatus {
    /// App session token. Never logged.
    pub session_token: SecretString,
    /// Whether the user has cards that can be added.
    pub has_eligible_cards: bool,
    /// Issuer base URL, if the app stored one.
    pub base_url: Option<String>,
}

impl WalletStatus {
    /// Reads the status written by the app. `None` when no token is stored.
    ///
    /// # Errors
    ///
    /// Returns a store error if the cache cannot be read.
    pub fn load(cache: &StatusCache) -> StorageResult<Option<Self>> {
        let Some(token) = cache.get(SESSION_TOKEN_KEY)? else {
            return Ok(None);
        };
        let has_eligible_cards = cache
            .get(HAS_ELIGIBLE_CARDS_KEY)?
            .is_some_and(|v| parse_flag(&v));
        let base_url = cache.get(BASE_URL_KEY)?.filter(|u| !u.trim().is_empty());
        Ok(Some(Self {
            session_token: SecretString::from(token),
            has_eligible_cards,
            base_url,
        }))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

/// A card the extension may offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    /// Issuer card identifier, used as the pass entry identifier.
    pub card_id: String,
    /// Product name.
    pub card_title: String,
    /// Masked card number, e.g. `**** **** **** 1234`.
    pub masked_card_number: String,
    /// Card art path relative to the issuer base URL.
    #[serde(default)]
    pub art_url: String,
    /// Card type or network label.
    #[serde(default)]
    pub card_type: String,
    /// Name embossed on the card.
    #[serde(rename = "HolderName", alias = "holderName")]
    pub holder_name: String,
}

impl CardDetails {
    /// Rejects cards the extension could not present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the blank field.
    pub fn validate(&self) -> Result<(), BridgeError> {
        for (field, value) in [
            ("cardId", &self.card_id),
            ("cardTitle", &self.card_title),
            ("maskedCardNumber", &self.masked_card_number),
            ("HolderName", &self.holder_name),
        ] {
            if value.trim().is_empty() {
                return Err(BridgeError::InvalidArgument(format!(
                    "card {}: {field} must not be empty",
                    self.card_id
                )));
            }
        }
        Ok(())
    }

    /// Add-request configuration presented for this card.
    #[must_use]
    pub fn provisioning_request(&self) -> ProvisioningRequest {
        ProvisioningRequest {
            card_suffix: last_four(&self.masked_card_number),
            cardholder_name: self.holder_name.clone(),
            primary_account_identifier: Some(self.card_id.clone()),
            localized_description: Some(self.card_title.clone()),
            payment_network: (!self.card_type.trim().is_empty()).then(|| self.card_type.clone()),
            encryption_scheme: EncryptionScheme::EccV2,
        }
    }
}

/// Capabilities the extension advertises to Wallet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, uniffi::Record)]
pub struct ExtensionStatus {
    /// Wallet must authenticate the user before listing entries.
    pub requires_authentication: bool,
    /// Entries can be added to this device.
    pub pass_entries_available: bool,
    /// Entries can be added to a paired device.
    pub remote_pass_entries_available: bool,
}

/// A card offered in Wallet's "From apps on your iPhone" list.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct PassEntry {
    /// Card identifier passed back to `generate_add_payment_pass_request`.
    pub identifier: String,
    /// Title shown in Wallet.
    pub title: String,
    /// Absolute card art URL; the host falls back to bundled art when absent.
    pub art_url: Option<String>,
    /// Add-request configuration for the card.
    pub request: ProvisioningRequest,
}

/// Core of the issuer provisioning extension.
#[derive(uniffi::Object)]
pub struct WalletExtension {
    cache: StatusCache,
    prober: EligibilityProber,
    card_data: Arc<dyn CardDataService>,
    challenge_timeout: Duration,
    store_timeout: Duration,
}

impl std::fmt::Debug for WalletExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletExtension")
            .field("challenge_timeout", &self.challenge_timeout)
            .finish_non_exhaustive()
    }
}

impl WalletExtension {
    /// Replaces the HTTP card-data service, e.g. with an in-process one.
    #[must_use]
    pub fn with_card_data_service(mut self, card_data: Arc<dyn CardDataService>) -> Self {
        self.card_data = card_data;
        self
    }

    /// Reads the shared cache on the blocking pool. Read failures and reads
    /// that outlast the platform query timeout both yield `None`.
    async fn read_cache<T, F>(&self, what: &str, read: F) -> Option<T>
    where
        F: FnOnce(&StatusCache) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        match bounded_blocking(self.store_timeout, what, move || read(&cache)).await {
            Ok(Some(Ok(value))) => Some(value),
            Ok(Some(Err(e))) => {
                log::warn!("{what} unreadable: {e}");
                None
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("{e}");
                None
            }
        }
    }

    async fn wallet_status(&self) -> Option<WalletStatus> {
        self.read_cache("wallet status", WalletStatus::load)
            .await
            .flatten()
            .filter(|status| !status.session_token.expose_secret().is_empty())
    }

    async fn cards(&self) -> Vec<CardDetails> {
        self.read_cache("stored card details", |cache| {
            cache.get_json::<Vec<CardDetails>>(CARD_DETAILS_KEY)
        })
        .await
        .flatten()
        .unwrap_or_default()
    }

    async fn entries(&self, remote: bool) -> Result<Vec<PassEntry>, BridgeError> {
        let Some(status) = self.wallet_status().await else {
            return Ok(Vec::new());
        };
        let known = self.prober.known_passes(remote).await?;

        let entries = self
            .cards()
            .await
            .into_iter()
            .filter(|card| {
                let key = LookupKey::PrimaryAccountIdentifier(card.card_id.clone());
                !known.iter().any(|pass| key.matches(pass))
            })
            .map(|card| PassEntry {
                art_url: art_url(status.base_url.as_deref(), &card.art_url),
                identifier: card.card_id.clone(),
                title: card.card_title.clone(),
                request: card.provisioning_request(),
            })
            .collect();
        Ok(entries)
    }
}

fn art_url(base_url: Option<&str>, art_path: &str) -> Option<String> {
    let art_path = art_path.trim();
    if art_path.is_empty() {
        return None;
    }
    if art_path.starts_with("https://") || art_path.starts_with("http://") {
        return Some(art_path.to_string());
    }
    let base = base_url?;
    Some(format!(
        "{}/{}",
        base.trim_end_matches('/'),
        art_path.trim_start_matches('/')
    ))
}

#[uniffi::export(async_runtime = "tokio")]
impl WalletExtension {
    /// Builds the extension core from host components and configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an invalid configuration.
    #[uniffi::constructor]
    pub fn new(
        provider: Arc<dyn PlatformProvider>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let cache = StatusCache::new(provider.status_store());
        let card_data =
            HttpCardDataService::new(&config)?.with_session_token_from(cache.clone());
        Ok(Self {
            prober: EligibilityProber::new(provider.pass_library(), config.platform_query_timeout()),
            card_data: Arc::new(card_data),
            challenge_timeout: config.challenge_timeout(),
            store_timeout: config.platform_query_timeout(),
            cache,
        })
    }

    /// Capabilities to report to Wallet.
    ///
    /// Requires a non-empty session token and eligible cards; a failed or
    /// slow read reports nothing available.
    pub async fn status(&self) -> ExtensionStatus {
        match self.wallet_status().await {
            Some(status) if status.has_eligible_cards => ExtensionStatus {
                requires_authentication: true,
                pass_entries_available: true,
                remote_pass_entries_available: true,
            },
            _ => ExtensionStatus::default(),
        }
    }

    /// Stored cards not yet provisioned on this device.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a pass library call panicked.
    pub async fn pass_entries(&self) -> Result<Vec<PassEntry>, BridgeError> {
        self.entries(false).await
    }

    /// Stored cards not yet provisioned on a paired device.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if a pass library call panicked.
    pub async fn remote_pass_entries(&self) -> Result<Vec<PassEntry>, BridgeError> {
        self.entries(true).await
    }

    /// Produces the encrypted payload for the card Wallet asked for.
    ///
    /// Returns `None` whenever the payload cannot be produced, so Wallet shows
    /// its own failure UI.
    pub async fn generate_add_payment_pass_request(
        &self,
        identifier: String,
        challenge: ProvisioningCertificateChallenge,
    ) -> Option<EncryptedPassData> {
        if let Err(e) = challenge.validate() {
            log::warn!("extension challenge rejected: {e}");
            return None;
        }
        let Some(card) = self
            .cards()
            .await
            .into_iter()
            .find(|c| c.card_id == identifier)
        else {
            log::warn!("no stored card with identifier {identifier}");
            return None;
        };
        let account = card.provisioning_request().account_reference();

        match tokio::time::timeout(
            self.challenge_timeout,
            self.card_data.fetch_encrypted_pass_data(&challenge, &account),
        )
        .await
        {
            Ok(Ok(data)) => Some(data),
            Ok(Err(e)) => {
                log::error!("card-data service failed for {identifier}: {e}");
                None
            }
            Err(_) => {
                log::error!(
                    "card-data service did not answer within {:?}",
                    self.challenge_timeout
                );
                None
            }
        }
    }
}
