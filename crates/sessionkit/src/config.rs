//! Configuration passed to sessionkit components at construction.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use sessionkit_chain::WaitOptions;
use sessionkit_core::FeeDesignation;

/// Credential for the chain RPC and submission endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for building request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field is empty.
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("required_confirmations must be at least 1")]
    ZeroConfirmations,

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Endpoints, credentials and defaults for one deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Chain RPC endpoint.
    pub rpc_url: String,

    /// Endpoint that accepts signed operations.
    pub submission_url: String,

    pub api_key: ApiKey,

    /// Fee token and chain used when the caller does not pick one.
    pub default_fee: FeeDesignation,

    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u32,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Ask for third-party fee sponsorship. The fee designation still
    /// applies.
    #[serde(default)]
    pub sponsorship: bool,
}

fn default_required_confirmations() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    2000
}

impl SessionsConfig {
    pub fn new(
        rpc_url: impl Into<String>,
        submission_url: impl Into<String>,
        api_key: ApiKey,
        default_fee: FeeDesignation,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            submission_url: submission_url.into(),
            api_key,
            default_fee,
            required_confirmations: default_required_confirmations(),
            poll_interval_ms: default_poll_interval_ms(),
            sponsorship: false,
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ConfigError::Empty("rpc_url"));
        }
        if self.submission_url.trim().is_empty() {
            return Err(ConfigError::Empty("submission_url"));
        }
        if self.api_key.expose().is_empty() {
            return Err(ConfigError::Empty("api_key"));
        }
        if self.required_confirmations == 0 {
            return Err(ConfigError::ZeroConfirmations);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Wait options with no deadline.
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            required_confirmations: self.required_confirmations,
            poll_interval: self.poll_interval(),
            deadline: None,
        }
    }
}
