use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::BridgeError;

const DEFAULT_CHALLENGE_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PLATFORM_QUERY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Runtime configuration of a bridge instance.
///
/// Hosts usually build it with [`default_bridge_config`] or hand the plugin
/// preferences over as JSON via [`BridgeConfig::from_json`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, uniffi::Record)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// Endpoint of the card-data service that encrypts pass data for a challenge.
    pub card_data_url: String,
    /// Upper bound for the whole challenge round-trip, retries included.
    pub challenge_timeout_ms: u64,
    /// Timeout of a single HTTP attempt against the card-data service.
    pub request_timeout_ms: u64,
    /// Retries for transient card-data failures (total attempts = retries + 1).
    pub max_retries: u32,
    /// Upper bound for a single pass library query.
    pub platform_query_timeout_ms: u64,
    /// Hands fetched pass data to the platform without waiting for the caller.
    pub auto_complete: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            card_data_url: String::new(),
            challenge_timeout_ms: DEFAULT_CHALLENGE_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            platform_query_timeout_ms: DEFAULT_PLATFORM_QUERY_TIMEOUT_MS,
            auto_complete: false,
        }
    }
}

impl BridgeConfig {
    /// Parses a configuration document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the document is not valid JSON or the
    /// resulting configuration fails [`BridgeConfig::validate`].
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks timeouts and the card-data endpoint.
    ///
    /// The endpoint must use HTTPS; plain HTTP is only accepted on loopback
    /// hosts for local development.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` describing the first offending field.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.challenge_timeout_ms == 0
            || self.request_timeout_ms == 0
            || self.platform_query_timeout_ms == 0
        {
            return Err(BridgeError::InvalidArgument(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        self.card_data_endpoint().map(|_| ())
    }

    pub(crate) fn card_data_endpoint(&self) -> Result<Url, BridgeError> {
        let url = Url::parse(&self.card_data_url).map_err(|e| {
            BridgeError::InvalidArgument(format!("card_data_url is not a valid URL: {e}"))
        })?;
        let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));
        match url.scheme() {
            "https" => Ok(url),
            "http" if loopback => Ok(url),
            scheme => Err(BridgeError::InvalidArgument(format!(
                "card_data_url must use https, got {scheme}"
            ))),
        }
    }

    pub(crate) const fn challenge_timeout(&self) -> Duration {
        Duration::from_millis(self.challenge_timeout_ms)
    }

    pub(crate) const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub(crate) const fn platform_query_timeout(&self) -> Duration {
        Duration::from_millis(self.platform_query_timeout_ms)
    }
}

/// Returns the default configuration pointed at `card_data_url`.
#[uniffi::export]
#[must_use]
pub fn default_bridge_config(card_data_url: String) -> BridgeConfig {
    BridgeConfig {
        card_data_url,
        ..BridgeConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_takes_defaults() {
        let config = BridgeConfig::from_json(
            r#"{"cardDataUrl": "https://issuer.example.com/provisioning/payload", "autoComplete": true}"#,
        )
        .unwrap();
        assert!(config.auto_complete);
        assert_eq!(config.challenge_timeout_ms, DEFAULT_CHALLENGE_TIMEOUT_MS);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn test_plain_http_only_on_loopback() {
        assert!(default_bridge_config("http://127.0.0.1:8080/payload".to_string())
            .validate()
            .is_ok());
        let err = default_bridge_config("http://issuer.example.com/payload".to_string())
            .validate()
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = BridgeConfig {
            challenge_timeout_ms: 0,
            ..default_bridge_config("https://issuer.example.com".to_string())
        };
        assert!(config.validate().is_err());
    }
}
