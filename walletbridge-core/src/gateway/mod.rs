//! Entry point for every caller invocation and platform delegate callback.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};

mod callback;

pub use callback::CommandCallback;
use callback::Resolver;

use crate::command::{scalar_to_string, Command, CommandName};
use crate::config::BridgeConfig;
use crate::eligibility::{EligibilityProber, LookupKey};
use crate::error::BridgeError;
use crate::extension::{
    CardDetails, BASE_URL_KEY, CARD_DETAILS_KEY, HAS_ELIGIBLE_CARDS_KEY, SESSION_TOKEN_KEY,
};
use crate::keychain::{save_cards, Keychain};
use crate::provider::PlatformProvider;
use crate::provisioning::{
    CardDataService, EncryptedPassData, HttpCardDataService, PlatformOutcome,
    ProvisioningCertificateChallenge, ProvisioningListener, ProvisioningRequest, Provisioner,
    SessionSnapshot,
};
use crate::runtime::{blocking, bounded_blocking, BridgeRuntime};
use crate::status_cache::{ClearScope, StatusCache, StorageResult};

/// Dispatches named commands to the bridge components and resolves each
/// command's callback exactly once.
#[derive(uniffi::Object)]
pub struct CommandGateway {
    prober: EligibilityProber,
    provisioner: Arc<Provisioner>,
    cache: StatusCache,
    keychain: Arc<dyn Keychain>,
    store_timeout: Duration,
    runtime: BridgeRuntime,
}

impl std::fmt::Debug for CommandGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandGateway")
            .field("prober", &self.prober)
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl CommandGateway {
    /// Builds a gateway around a caller-supplied card-data service.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an invalid configuration, `Internal` if no
    /// runtime can be started.
    pub fn with_card_data_service(
        provider: &Arc<dyn PlatformProvider>,
        config: &BridgeConfig,
        listener: Option<Arc<dyn ProvisioningListener>>,
        card_data: Arc<dyn CardDataService>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        let runtime = BridgeRuntime::new()?;
        let provisioner = Provisioner::new(
            provider.provisioning(),
            card_data,
            listener,
            runtime.handle().clone(),
            config.challenge_timeout(),
            config.auto_complete,
        );
        log::info!(
            "wallet bridge ready (auto_complete: {}, challenge timeout {:?})",
            config.auto_complete,
            config.challenge_timeout()
        );
        Ok(Self {
            prober: EligibilityProber::new(provider.pass_library(), config.platform_query_timeout()),
            provisioner: Arc::new(provisioner),
            cache: StatusCache::new(provider.status_store()),
            keychain: provider.keychain(),
            store_timeout: config.platform_query_timeout(),
            runtime,
        })
    }

    /// Runs a parsed command to completion.
    ///
    /// # Errors
    ///
    /// Returns the command's failure, already mapped onto the caller taxonomy.
    pub async fn execute(&self, command: Command) -> Result<Value, BridgeError> {
        match command.name {
            CommandName::IsAvailable => Ok(json!(self.prober.is_wallet_available().await?)),
            CommandName::CheckCardEligibility => {
                let key = account_key(&command)?;
                to_payload(&self.prober.check_card_eligibility(key).await?)
            }
            CommandName::CheckCardEligibilityBySuffix => {
                let key = suffix_key(&command)?;
                to_payload(&self.prober.check_card_eligibility(key).await?)
            }
            CommandName::CheckPairedDevices => {
                let key = account_key(&command)?;
                Ok(json!(self.prober.check_paired_devices(key).await?))
            }
            CommandName::CheckPairedDevicesBySuffix => {
                let key = suffix_key(&command)?;
                Ok(json!(self.prober.check_paired_devices(key).await?))
            }
            CommandName::StartAddPaymentPass => {
                let request: ProvisioningRequest = command.decode_arg(0, "request")?;
                let provisioner = Arc::clone(&self.provisioner);
                to_payload(&blocking("startAddPaymentPass", move || provisioner.start(request)).await??)
            }
            CommandName::CompleteAddPaymentPass => {
                let data: Option<EncryptedPassData> =
                    command.optional_decode_arg(0, "encryptedPassData")?;
                to_payload(&self.provisioner.complete(data).await?)
            }
            CommandName::CancelAddPaymentPass => {
                let session_id = command.optional_string_arg(0, "sessionId")?;
                let provisioner = Arc::clone(&self.provisioner);
                to_payload(
                    &blocking("cancelAddPaymentPass", move || {
                        provisioner.cancel(session_id.as_deref())
                    })
                    .await??,
                )
            }
            CommandName::GetAddPaymentPassStatus => to_payload(&self.provisioner.status()),
            CommandName::SaveCardsToKeychain => {
                let Some(payload) = command.arg(0).cloned() else {
                    return Err(BridgeError::InvalidArgument(
                        "card payload is required".to_string(),
                    ));
                };
                let keychain = Arc::clone(&self.keychain);
                blocking("saveCardsToKeychain", move || save_cards(&keychain, &payload)).await??;
                Ok(json!(true))
            }
            CommandName::SaveWalletStatus => {
                let entries = status_entries(&command)?;
                self.with_store("saveWalletStatus", move |cache| {
                    entries
                        .iter()
                        .try_for_each(|(key, value)| cache.save(key, value))
                })
                .await?;
                Ok(json!(true))
            }
            CommandName::GetWalletStatus => match command.optional_string_arg(0, "key")? {
                Some(key) => {
                    let value = self
                        .with_store("getWalletStatus", move |cache| cache.get(&key))
                        .await?;
                    Ok(value.map_or(Value::Null, Value::String))
                }
                None => self.with_store("getWalletStatus", wallet_status_summary).await,
            },
            CommandName::ClearWalletStatus => {
                let scope = command
                    .optional_string_arg(0, "key")?
                    .map_or(ClearScope::All, ClearScope::Key);
                self.with_store("clearWalletStatus", move |cache| cache.clear(scope))
                    .await?;
                Ok(json!(true))
            }
            CommandName::TestWalletExtension => {
                self.with_store("testWalletExtension", StatusCache::test_extension)
                    .await?;
                Ok(json!(true))
            }
            CommandName::SaveCardDetailsForExtension => {
                let cards: Vec<CardDetails> = command.decode_arg(0, "cards")?;
                cards.iter().try_for_each(CardDetails::validate)?;
                let count = cards.len();
                self.with_store("saveCardDetailsForExtension", move |cache| {
                    cache.save_json(CARD_DETAILS_KEY, &cards)
                })
                .await?;
                log::info!("stored {count} card(s) for the wallet extension");
                Ok(json!(true))
            }
        }
    }

    /// Runs a status cache operation on the blocking pool, bounded by the
    /// platform query timeout.
    async fn with_store<T, F>(&self, what: &'static str, op: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&StatusCache) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let cache = self.cache.clone();
        bounded_blocking(self.store_timeout, what, move || op(&cache))
            .await?
            .ok_or_else(|| {
                BridgeError::StorageFailure(format!("{what}: status store did not answer in time"))
            })?
            .map_err(BridgeError::from)
    }
}

#[uniffi::export]
impl CommandGateway {
    /// Builds a gateway using the HTTP card-data service from `config`.
    ///
    /// The service sends the `sessionToken` cache entry as a bearer token.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an invalid configuration, `Internal` if no
    /// runtime can be started.
    #[uniffi::constructor]
    pub fn new(
        provider: Arc<dyn PlatformProvider>,
        config: BridgeConfig,
        listener: Option<Arc<dyn ProvisioningListener>>,
    ) -> Result<Self, BridgeError> {
        let cache = StatusCache::new(provider.status_store());
        let card_data = HttpCardDataService::new(&config)?.with_session_token_from(cache);
        Self::with_card_data_service(&provider, &config, listener, Arc::new(card_data))
    }

    /// Accepts a command and returns immediately.
    ///
    /// `callback` is resolved exactly once with the command's result. Unknown
    /// command names are rejected without dispatch.
    pub fn invoke(
        self: Arc<Self>,
        name: String,
        arguments_json: String,
        callback_id: String,
        callback: Arc<dyn CommandCallback>,
    ) {
        let resolver = Resolver::new(callback_id.clone(), callback);
        let command = match Command::parse(&name, &arguments_json, callback_id) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("rejecting command {name}: {e}");
                resolver.resolve(Err(e));
                return;
            }
        };

        log::debug!("dispatching {}", command.name.as_ref());
        let gateway = Arc::clone(&self);
        self.runtime.handle().spawn(async move {
            let result = gateway.execute(command).await;
            resolver.resolve(result);
        });
    }

    /// Forwards the platform's certificate challenge for `session_id`.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the session is not awaiting a challenge; the
    /// platform has then already been answered with "no data".
    pub fn deliver_challenge(
        &self,
        session_id: String,
        challenge: ProvisioningCertificateChallenge,
    ) -> Result<(), BridgeError> {
        self.provisioner.deliver_challenge(&session_id, challenge)
    }

    /// Records the platform's final report for `session_id`.
    pub fn platform_did_finish(&self, session_id: String, outcome: PlatformOutcome) {
        self.provisioner.platform_did_finish(&session_id, outcome);
    }

    /// Snapshot of the current or last provisioning session.
    #[must_use]
    pub fn session_status(&self) -> SessionSnapshot {
        self.provisioner.status()
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, BridgeError> {
    serde_json::to_value(value)
        .map_err(|e| BridgeError::Internal(format!("failed to encode result: {e}")))
}

fn account_key(command: &Command) -> Result<LookupKey, BridgeError> {
    Ok(LookupKey::PrimaryAccountIdentifier(
        command.string_arg(0, "primaryAccountIdentifier")?,
    ))
}

fn suffix_key(command: &Command) -> Result<LookupKey, BridgeError> {
    Ok(LookupKey::Suffix(command.string_arg(0, "cardSuffix")?))
}

/// Accepts either `(key, value)` or a single object of entries.
fn status_entries(command: &Command) -> Result<Vec<(String, String)>, BridgeError> {
    if let Some(Value::Object(map)) = command.arg(0) {
        if map.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "wallet status object is empty".to_string(),
            ));
        }
        return map
            .iter()
            .map(|(key, value)| {
                scalar_to_string(value).map(|v| (key.clone(), v)).ok_or_else(|| {
                    BridgeError::InvalidArgument(format!("{key} must be a scalar value"))
                })
            })
            .collect();
    }
    let key = command.string_arg(0, "key")?;
    let value = command
        .arg(1)
        .ok_or_else(|| BridgeError::InvalidArgument("value is required".to_string()))
        .and_then(|v| {
            scalar_to_string(v)
                .ok_or_else(|| BridgeError::InvalidArgument("value must be a scalar".to_string()))
        })?;
    Ok(vec![(key, value)])
}

/// The well-known entries, with the session token reduced to its presence.
fn wallet_status_summary(cache: &StatusCache) -> StorageResult<Value> {
    let mut summary = Map::new();
    let has_token = cache
        .get(SESSION_TOKEN_KEY)?
        .is_some_and(|token| !token.is_empty());
    summary.insert("hasSessionToken".to_string(), json!(has_token));
    summary.insert(
        HAS_ELIGIBLE_CARDS_KEY.to_string(),
        json!(cache
            .get(HAS_ELIGIBLE_CARDS_KEY)?
            .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")),
    );
    summary.insert(
        BASE_URL_KEY.to_string(),
        cache.get(BASE_URL_KEY)?.map_or(Value::Null, Value::String),
    );
    Ok(Value::Object(summary))
}
