//! Recovery configuration and network defaults.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{RecoveryError, RecoveryResult};

/// Default node of the main network.
pub const MAINNET_NODE_URL: &str = "https://grpc.mainnet.recoverykit.net";

/// Default node of the test network.
pub const TESTNET_NODE_URL: &str = "https://grpc.testnet.recoverykit.net";

/// Credential numbers are a single byte, so at most 255 are looked up per identity.
const MAX_CREDENTIALS_LIMIT: u32 = 255;

/// The network a recovery runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[strum(serialize_all = "lowercase")]
pub enum Environment {
    /// The main network.
    Mainnet,
    /// The public test network.
    Testnet,
}

impl Environment {
    /// The default node URL of the network.
    #[must_use]
    pub const fn default_node_url(self) -> &'static str {
        match self {
            Self::Mainnet => MAINNET_NODE_URL,
            Self::Testnet => TESTNET_NODE_URL,
        }
    }
}

/// Tunables of a recovery session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecoveryConfig {
    /// Fixed upper bound (exclusive) of the credential numbers looked up per identity.
    pub max_credentials_on_account: u32,
    /// Length of the empty run after which the user is asked whether to go on.
    pub identity_spaces_between_warning: u32,
    /// Number of account lookups in flight at once while scanning one identity.
    pub scan_concurrency: usize,
    /// Base URL of the chain node.
    pub node_url: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_credentials_on_account: 200,
            identity_spaces_between_warning: 5,
            scan_concurrency: 1,
            node_url: MAINNET_NODE_URL.to_string(),
        }
    }
}

impl RecoveryConfig {
    /// Default configuration for `environment`, optionally pointing at another node.
    #[must_use]
    pub fn from_environment(environment: Environment, node_url: Option<String>) -> Self {
        Self {
            node_url: node_url.unwrap_or_else(|| environment.default_node_url().to_string()),
            ..Self::default()
        }
    }

    /// Parses a JSON configuration. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or the values are out of range.
    pub fn from_json(json: &str) -> RecoveryResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| RecoveryError::invalid_input("config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is in range.
    ///
    /// # Errors
    /// Returns [`RecoveryError::InvalidInput`] naming the first offending field.
    pub fn validate(&self) -> RecoveryResult<()> {
        if !(1..=MAX_CREDENTIALS_LIMIT).contains(&self.max_credentials_on_account) {
            return Err(RecoveryError::invalid_input(
                "max_credentials_on_account",
                format!("must be between 1 and {MAX_CREDENTIALS_LIMIT}"),
            ));
        }
        if self.identity_spaces_between_warning == 0 {
            return Err(RecoveryError::invalid_input(
                "identity_spaces_between_warning",
                "must be at least 1",
            ));
        }
        if self.scan_concurrency == 0 {
            return Err(RecoveryError::invalid_input(
                "scan_concurrency",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use test_case::test_case;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RecoveryConfig::default();
        assert_eq!(config.max_credentials_on_account, 200);
        assert_eq!(config.identity_spaces_between_warning, 5);
        assert_eq!(config.scan_concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = RecoveryConfig::from_json(r#"{"identitySpacesBetweenWarning": 3}"#).unwrap();
        assert_eq!(config.identity_spaces_between_warning, 3);
        assert_eq!(config.max_credentials_on_account, 200);
    }

    #[test_case(r#"{"maxCredentialsOnAccount": 0}"#, "max_credentials_on_account" ; "zero bound")]
    #[test_case(r#"{"maxCredentialsOnAccount": 256}"#, "max_credentials_on_account" ; "bound too large")]
    #[test_case(r#"{"identitySpacesBetweenWarning": 0}"#, "identity_spaces_between_warning" ; "zero spaces")]
    #[test_case(r#"{"scanConcurrency": 0}"#, "scan_concurrency" ; "zero concurrency")]
    fn test_from_json_rejects(json: &str, expected: &str) {
        match RecoveryConfig::from_json(json) {
            Err(RecoveryError::InvalidInput { attribute, .. }) => assert_eq!(attribute, expected),
            other => panic!("expected invalid input, got {other:?}"),
        }
    }

    #[test]
    fn test_environment() {
        assert_eq!(Environment::from_str("testnet").unwrap(), Environment::Testnet);
        assert!(Environment::from_str("devnet").is_err());

        let config = RecoveryConfig::from_environment(Environment::Testnet, None);
        assert_eq!(config.node_url, TESTNET_NODE_URL);
        let config = RecoveryConfig::from_environment(
            Environment::Mainnet,
            Some("http://127.0.0.1:20000".to_string()),
        );
        assert_eq!(config.node_url, "http://127.0.0.1:20000");
    }
}
