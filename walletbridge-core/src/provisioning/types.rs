//! Data exchanged during the provisioning handshake.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, ErrorKind};

/// Encryption scheme negotiated with the secure element.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, uniffi::Enum,
)]
pub enum EncryptionScheme {
    /// Elliptic-curve scheme (`PKEncryptionSchemeECC_V2`).
    #[default]
    #[serde(rename = "ECC_V2")]
    EccV2,
    /// RSA scheme (`PKEncryptionSchemeRSA_V2`).
    #[serde(rename = "RSA_V2")]
    RsaV2,
}

/// Card the caller wants to add to Wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    /// Last digits of the card number shown in the provisioning UI.
    pub card_suffix: String,
    /// Name embossed on the card.
    pub cardholder_name: String,
    /// Issuer account identifier, when known.
    #[serde(default)]
    pub primary_account_identifier: Option<String>,
    /// Description shown by Wallet, e.g. the product name.
    #[serde(default)]
    pub localized_description: Option<String>,
    /// Payment network hint (`Visa`, `MasterCard`, ...).
    #[serde(default)]
    pub payment_network: Option<String>,
    /// Scheme requested from the platform.
    #[serde(default)]
    pub encryption_scheme: EncryptionScheme,
}

impl ProvisioningRequest {
    /// Rejects blank required fields and blank optional identifiers.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the offending field.
    pub fn validate(&self) -> Result<(), BridgeError> {
        require_non_blank("cardSuffix", &self.card_suffix)?;
        require_non_blank("cardholderName", &self.cardholder_name)?;
        if let Some(identifier) = &self.primary_account_identifier {
            require_non_blank("primaryAccountIdentifier", identifier)?;
        }
        Ok(())
    }

    /// Account reference forwarded to the card-data service.
    #[must_use]
    pub fn account_reference(&self) -> CardAccountReference {
        CardAccountReference {
            primary_account_identifier: self.primary_account_identifier.clone(),
            card_suffix: self.card_suffix.clone(),
            cardholder_name: self.cardholder_name.clone(),
        }
    }
}

/// Identifies the cardholder's account towards the card-data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardAccountReference {
    /// Issuer account identifier, when known.
    pub primary_account_identifier: Option<String>,
    /// Last digits of the card number.
    pub card_suffix: String,
    /// Name embossed on the card.
    pub cardholder_name: String,
}

/// Certificate chain and nonce issued by the platform mid-flow.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct ProvisioningCertificateChallenge {
    /// DER certificates, leaf first.
    pub certificates: Vec<Vec<u8>>,
    /// One-time nonce the encrypted payload must be bound to.
    pub nonce: Vec<u8>,
    /// Device signature over the nonce.
    pub nonce_signature: Vec<u8>,
    /// Scheme the platform used to build the challenge.
    pub encryption_scheme: EncryptionScheme,
}

impl ProvisioningCertificateChallenge {
    /// Rejects challenges missing certificates, nonce or signature.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the missing part.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.certificates.is_empty() || self.certificates.iter().any(Vec::is_empty) {
            return Err(BridgeError::InvalidArgument(
                "challenge carries no certificates".to_string(),
            ));
        }
        if self.nonce.is_empty() {
            return Err(BridgeError::InvalidArgument("challenge nonce is empty".to_string()));
        }
        if self.nonce_signature.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "challenge nonce signature is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Encrypted card payload handed back to the platform.
///
/// The JSON form encodes each field as standard base64.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPassData {
    /// Issuer activation data (may be empty when the issuer does not use it).
    #[serde(with = "base64_bytes", default)]
    pub activation_data: Vec<u8>,
    /// Card data encrypted for the secure element.
    #[serde(with = "base64_bytes")]
    pub encrypted_pass_data: Vec<u8>,
    /// Issuer ephemeral public key used for the encryption.
    #[serde(with = "base64_bytes")]
    pub ephemeral_public_key: Vec<u8>,
}

impl std::fmt::Debug for EncryptedPassData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPassData")
            .field("activation_data", &self.activation_data.len())
            .field("encrypted_pass_data", &self.encrypted_pass_data.len())
            .field("ephemeral_public_key", &self.ephemeral_public_key.len())
            .finish()
    }
}

impl EncryptedPassData {
    /// Rejects payloads the platform cannot consume.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the encrypted data or key is empty.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.encrypted_pass_data.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "encryptedPassData is empty".to_string(),
            ));
        }
        if self.ephemeral_public_key.is_empty() {
            return Err(BridgeError::InvalidArgument(
                "ephemeralPublicKey is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Observable state of a provisioning session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, uniffi::Enum)]
#[serde(rename_all = "camelCase")]
pub enum ProvisioningState {
    /// No session has run yet.
    Idle,
    /// The platform UI is up; waiting for the certificate challenge.
    AwaitingChallenge,
    /// The challenge is with the card-data service.
    FetchingEncryptedData,
    /// Encrypted data is available; waiting for `completeAddPaymentPass`.
    ReadyToComplete,
    /// The platform acknowledged the pass. Terminal.
    Completed,
    /// The session ended without a pass. Terminal.
    Failed,
}

/// Point-in-time view of a session, used for status queries and events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, uniffi::Record)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Session identifier; empty while `Idle`.
    pub session_id: String,
    /// Current state.
    pub state: ProvisioningState,
    /// Failure category, set only in `Failed`.
    pub error_kind: Option<ErrorKind>,
    /// Failure description, set only in `Failed`.
    pub message: Option<String>,
}

impl SessionSnapshot {
    pub(crate) const fn idle() -> Self {
        Self {
            session_id: String::new(),
            state: ProvisioningState::Idle,
            error_kind: None,
            message: None,
        }
    }
}

fn require_non_blank(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded.trim())
            .map_err(serde::de::Error::custom)
    }
}
