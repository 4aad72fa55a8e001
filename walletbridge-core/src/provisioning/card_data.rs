//! Issuer card-data service: turns a platform challenge into encrypted pass data.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{
    CardAccountReference, EncryptedPassData, EncryptionScheme, ProvisioningCertificateChallenge,
};
use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::extension::SESSION_TOKEN_KEY;
use crate::http_request::{HttpError, Request};
use crate::runtime::blocking;
use crate::status_cache::StatusCache;

/// Errors produced while obtaining encrypted pass data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CardDataError {
    /// The service could not be reached.
    #[error(transparent)]
    Transport(#[from] HttpError),
    /// The service answered but refused to encrypt the card.
    #[error("issuer rejected the request (status {status}): {message}")]
    Rejected {
        /// HTTP status returned by the service.
        status: u16,
        /// Body or reason supplied by the service.
        message: String,
    },
    /// The service answered with an unusable payload.
    #[error("invalid card-data response: {0}")]
    InvalidResponse(String),
}

/// Produces [`EncryptedPassData`] for a challenge.
///
/// Implementations may take as long as they need; the provisioning session
/// bounds every call with the configured challenge timeout.
#[async_trait]
pub trait CardDataService: Send + Sync {
    /// Encrypts the card identified by `account` against `challenge`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or issuer rejection.
    async fn fetch_encrypted_pass_data(
        &self,
        challenge: &ProvisioningCertificateChallenge,
        account: &CardAccountReference,
    ) -> Result<EncryptedPassData, CardDataError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PayloadRequest<'a> {
    certificates: Vec<String>,
    nonce: String,
    nonce_signature: String,
    encryption_scheme: EncryptionScheme,
    #[serde(flatten)]
    account: &'a CardAccountReference,
}

/// Accepts the issuer's historical PascalCase field names as well as camelCase.
#[derive(Deserialize)]
struct PayloadResponse {
    #[serde(rename = "ActivationData", alias = "activationData", default)]
    activation_data: Option<String>,
    #[serde(rename = "EncryptedData", alias = "encryptedPassData", default)]
    encrypted_data: Option<String>,
    #[serde(
        rename = "EphermeralPublicKey",
        alias = "ephemeralPublicKey",
        alias = "EphemeralPublicKey",
        default
    )]
    ephemeral_public_key: Option<String>,
}

impl PayloadResponse {
    fn into_pass_data(self) -> Result<EncryptedPassData, CardDataError> {
        let decode = |field: &str, value: Option<String>| {
            STANDARD
                .decode(value.unwrap_or_default().trim())
                .map_err(|e| CardDataError::InvalidResponse(format!("{field}: {e}")))
        };
        let data = EncryptedPassData {
            activation_data: decode("ActivationData", self.activation_data)?,
            encrypted_pass_data: decode("EncryptedData", self.encrypted_data)?,
            ephemeral_public_key: decode("EphermeralPublicKey", self.ephemeral_public_key)?,
        };
        data.validate()
            .map_err(|e| CardDataError::InvalidResponse(e.to_string()))?;
        Ok(data)
    }
}

/// Card-data service reached over HTTPS with a JSON POST.
///
/// When a status cache is attached, the `sessionToken` entry written by the
/// app is sent as a bearer token on every request.
#[derive(Debug)]
pub struct HttpCardDataService {
    endpoint: Url,
    request: Request,
    token_source: Option<StatusCache>,
}

impl HttpCardDataService {
    /// Builds the service from the bridge configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configured endpoint is not acceptable.
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        Ok(Self {
            endpoint: config.card_data_endpoint()?,
            request: Request::new(config.request_timeout(), config.max_retries),
            token_source: None,
        })
    }

    /// Sends the session token stored in `cache` with each request.
    #[must_use]
    pub fn with_session_token_from(mut self, cache: StatusCache) -> Self {
        self.token_source = Some(cache);
        self
    }

    /// Reads the token on the blocking pool so a stuck store cannot hold up
    /// the caller's timeout.
    async fn session_token(&self) -> Option<SecretString> {
        let cache = self.token_source.clone()?;
        match blocking("session token read", move || cache.get(SESSION_TOKEN_KEY)).await {
            Ok(Ok(token)) => token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            Ok(Err(e)) => {
                log::warn!("session token unavailable: {e}");
                None
            }
            Err(e) => {
                log::warn!("{e}");
                None
            }
        }
    }
}

#[async_trait]
impl CardDataService for HttpCardDataService {
    async fn fetch_encrypted_pass_data(
        &self,
        challenge: &ProvisioningCertificateChallenge,
        account: &CardAccountReference,
    ) -> Result<EncryptedPassData, CardDataError> {
        let body = PayloadRequest {
            certificates: challenge
                .certificates
                .iter()
                .map(|c| STANDARD.encode(c))
                .collect(),
            nonce: STANDARD.encode(&challenge.nonce),
            nonce_signature: STANDARD.encode(&challenge.nonce_signature),
            encryption_scheme: challenge.encryption_scheme,
            account,
        };

        let mut builder = self
            .request
            .post(self.endpoint.as_str())
            .header("Accept", "application/json")
            .json(&body);
        if let Some(token) = self.session_token().await {
            builder = builder.bearer_auth(token.expose_secret());
        }

        let response = self.request.handle(builder).await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("Unknown error"));
            return Err(CardDataError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await.map_err(|e| {
            CardDataError::InvalidResponse(format!("failed to read response body: {e}"))
        })?;
        serde_json::from_str::<PayloadResponse>(&text)
            .map_err(|e| CardDataError::InvalidResponse(e.to_string()))?
            .into_pass_data()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::config::default_bridge_config;
    use crate::status_cache::{MemoryStatusStore, StatusStore, StorageResult};

    /// Store whose reads take a full second.
    struct StuckStore;

    impl StatusStore for StuckStore {
        fn read(&self, _key: String) -> StorageResult<Option<String>> {
            std::thread::sleep(Duration::from_secs(1));
            Ok(Some("late-token".to_string()))
        }
        fn write(&self, _key: String, _value: String) -> StorageResult<()> {
            Ok(())
        }
        fn remove(&self, _key: String) -> StorageResult<()> {
            Ok(())
        }
        fn remove_all(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn challenge() -> ProvisioningCertificateChallenge {
        ProvisioningCertificateChallenge {
            certificates: vec![vec![0x30, 0x82], vec![0x30, 0x81]],
            nonce: vec![1, 2, 3, 4],
            nonce_signature: vec![9, 9],
            encryption_scheme: EncryptionScheme::EccV2,
        }
    }

    fn account() -> CardAccountReference {
        CardAccountReference {
            primary_account_identifier: Some("acct-1".to_string()),
            card_suffix: "1234".to_string(),
            cardholder_name: "A B".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_success_with_legacy_field_names() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/payload")
            .match_header("content-type", "application/json")
            .match_header("authorization", "Bearer token-xyz")
            .match_body(Matcher::PartialJson(json!({
                "nonce": "AQIDBA==",
                "nonceSignature": "CQk=",
                "encryptionScheme": "ECC_V2",
                "cardSuffix": "1234",
                "primaryAccountIdentifier": "acct-1",
            })))
            .with_status(200)
            .with_body(
                r#"{"ActivationData": "AQ==", "EncryptedData": "AgI=", "EphermeralPublicKey": "AwMD"}"#,
            )
            .create_async()
            .await;

        let cache = StatusCache::new(Arc::new(MemoryStatusStore::new()));
        cache.save(SESSION_TOKEN_KEY, "token-xyz").unwrap();
        let service =
            HttpCardDataService::new(&default_bridge_config(format!("{}/payload", server.url())))
                .unwrap()
                .with_session_token_from(cache);

        let data = service
            .fetch_encrypted_pass_data(&challenge(), &account())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(data.activation_data, vec![1]);
        assert_eq!(data.encrypted_pass_data, vec![2, 2]);
        assert_eq!(data.ephemeral_public_key, vec![3, 3, 3]);
    }

    #[tokio::test]
    async fn test_issuer_rejection_is_reported() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/payload")
            .with_status(403)
            .with_body("card not eligible")
            .create_async()
            .await;

        let service =
            HttpCardDataService::new(&default_bridge_config(format!("{}/payload", server.url())))
                .unwrap();
        let err = service
            .fetch_encrypted_pass_data(&challenge(), &account())
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert_eq!(
            err,
            CardDataError::Rejected {
                status: 403,
                message: "card not eligible".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_empty_payload_is_invalid() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/payload")
            .with_status(200)
            .with_body(r#"{"ActivationData": null, "EncryptedData": "", "EphermeralPublicKey": ""}"#)
            .create_async()
            .await;

        let service =
            HttpCardDataService::new(&default_bridge_config(format!("{}/payload", server.url())))
                .unwrap();
        let err = service
            .fetch_encrypted_pass_data(&challenge(), &account())
            .await
            .unwrap_err();
        assert!(matches!(err, CardDataError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_stuck_token_store_does_not_outlive_timeout() {
        let service = HttpCardDataService::new(&default_bridge_config(
            "https://issuer.example/payload".to_string(),
        ))
        .unwrap()
        .with_session_token_from(StatusCache::new(Arc::new(StuckStore)));

        let started = Instant::now();
        let fetched = tokio::time::timeout(
            Duration::from_millis(100),
            service.fetch_encrypted_pass_data(&challenge(), &account()),
        )
        .await;

        assert!(fetched.is_err());
        assert!(started.elapsed() < Duration::from_millis(800));
    }
}
