//! Parsing of caller invocations into typed commands.

use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;
use strum::{AsRefStr, EnumString};

use crate::error::BridgeError;

/// Every command the bridge answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "camelCase")]
pub enum CommandName {
    /// Is Wallet usable on this device.
    IsAvailable,
    /// Eligibility by primary account identifier.
    CheckCardEligibility,
    /// Eligibility by card suffix.
    CheckCardEligibilityBySuffix,
    /// Paired-device presence by primary account identifier.
    CheckPairedDevices,
    /// Paired-device presence by card suffix.
    CheckPairedDevicesBySuffix,
    /// Start a provisioning session.
    StartAddPaymentPass,
    /// Hand the encrypted payload to the platform.
    CompleteAddPaymentPass,
    /// Abort the active provisioning session.
    CancelAddPaymentPass,
    /// Snapshot of the current provisioning session.
    GetAddPaymentPassStatus,
    /// Store card data in the shared keychain.
    SaveCardsToKeychain,
    /// Write status cache entries.
    SaveWalletStatus,
    /// Read status cache entries.
    GetWalletStatus,
    /// Remove status cache entries.
    ClearWalletStatus,
    /// Round-trip a probe entry through the status cache.
    TestWalletExtension,
    /// Store the card list read by the Wallet extension.
    SaveCardDetailsForExtension,
}

/// A single caller invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Which command to run.
    pub name: CommandName,
    /// Positional JSON arguments.
    pub arguments: Vec<Value>,
    /// Opaque handle echoed back on resolution.
    pub callback_id: String,
}

impl Command {
    /// Parses a raw invocation.
    ///
    /// `arguments_json` must be a JSON array; an empty string means no
    /// arguments.
    ///
    /// # Errors
    ///
    /// `UnsupportedOperation` for an unknown name, `InvalidArgument` when
    /// the arguments are not a JSON array.
    pub fn parse(
        name: &str,
        arguments_json: &str,
        callback_id: impl Into<String>,
    ) -> Result<Self, BridgeError> {
        let name = CommandName::from_str(name)
            .map_err(|_| BridgeError::UnsupportedOperation(name.to_string()))?;
        let arguments = if arguments_json.trim().is_empty() {
            Vec::new()
        } else {
            match serde_json::from_str::<Value>(arguments_json)? {
                Value::Array(arguments) => arguments,
                other => {
                    return Err(BridgeError::InvalidArgument(format!(
                        "arguments must be a JSON array, got {}",
                        json_type(&other)
                    )))
                }
            }
        };
        Ok(Self {
            name,
            arguments,
            callback_id: callback_id.into(),
        })
    }

    /// Argument at `index`; JSON `null` counts as absent.
    #[must_use]
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.arguments.get(index).filter(|v| !v.is_null())
    }

    /// Required argument rendered as a string. Numbers and booleans are
    /// accepted and stringified.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when missing, blank or structured.
    pub fn string_arg(&self, index: usize, field: &str) -> Result<String, BridgeError> {
        self.optional_string_arg(index, field)?
            .ok_or_else(|| BridgeError::InvalidArgument(format!("{field} is required")))
    }

    /// Optional argument rendered as a string.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when present but blank or structured.
    pub fn optional_string_arg(
        &self,
        index: usize,
        field: &str,
    ) -> Result<Option<String>, BridgeError> {
        let Some(value) = self.arg(index) else {
            return Ok(None);
        };
        let text = scalar_to_string(value).ok_or_else(|| {
            BridgeError::InvalidArgument(format!(
                "{field} must be a string, got {}",
                json_type(value)
            ))
        })?;
        if text.trim().is_empty() {
            return Err(BridgeError::InvalidArgument(format!("{field} must not be empty")));
        }
        Ok(Some(text))
    }

    /// Required argument decoded into `T`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when missing or not decodable.
    pub fn decode_arg<T: DeserializeOwned>(
        &self,
        index: usize,
        field: &str,
    ) -> Result<T, BridgeError> {
        self.optional_decode_arg(index, field)?
            .ok_or_else(|| BridgeError::InvalidArgument(format!("{field} is required")))
    }

    /// Optional argument decoded into `T`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` when present but not decodable.
    pub fn optional_decode_arg<T: DeserializeOwned>(
        &self,
        index: usize,
        field: &str,
    ) -> Result<Option<T>, BridgeError> {
        self.arg(index)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| BridgeError::InvalidArgument(format!("{field}: {e}")))
            })
            .transpose()
    }
}

pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
