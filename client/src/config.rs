//! Client configuration.
//!
//! This module provides configuration for connecting to a governance gateway on a given
//! network, choosing which chain backend to construct, and the governance defaults applied
//! to new organizations.

use crate::catalog::DEFAULT_MAX_LISTED_ITEMS;
use crate::error::{GovernanceError, Result};
use crate::types::GovernanceSettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Local development chain
    Local,
    /// Ethereum Sepolia testnet
    Sepolia,
    /// Custom network with user-defined endpoints
    Custom,
}

impl Network {
    /// Chain identifier
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Local => 1337,
            Network::Sepolia => 11155111,
            Network::Custom => 0,
        }
    }

    /// Default gateway URL for this network
    pub fn default_rpc_url(&self) -> &'static str {
        match self {
            Network::Local => "http://127.0.0.1:8545",
            Network::Sepolia => "https://rpc.sepolia.org",
            Network::Custom => "",
        }
    }

    /// Default organization factory address for this network
    pub fn default_factory_address(&self) -> &'static str {
        match self {
            Network::Local => "0x2279B7A0a67DB372996a5FaB50D91eAA73d2eBe6",
            Network::Sepolia | Network::Custom => "",
        }
    }
}

/// Which chain backend a coordinator is built on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON-RPC governance gateway
    Rpc,
    /// In-process simulated chain
    Local,
}

/// Configuration for the governance client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Network to connect to
    pub network: Network,

    /// Gateway endpoint URL
    pub rpc_url: String,

    /// Chain identifier
    pub chain_id: u64,

    /// Organization factory contract
    pub factory_address: String,

    /// Account the gateway signs with
    pub signer_address: String,

    /// Backend implementation
    pub backend: BackendKind,

    /// HTTP request timeout
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Maximum number of retries for read calls (0 disables retrying)
    pub max_retries: usize,

    /// Initial retry delay (in milliseconds)
    pub retry_initial_delay_ms: u64,

    /// Maximum retry delay (in milliseconds)
    pub retry_max_delay_ms: u64,

    /// Retry backoff multiplier
    pub retry_multiplier: f64,

    /// Confirmation polling interval (in milliseconds)
    pub confirmation_poll_interval_ms: u64,

    /// Confirmation timeout (in seconds)
    pub confirmation_timeout_secs: u64,

    /// Item fetches in flight during a listing
    pub listing_concurrency: usize,

    /// Largest item count a listing accepts from the backend
    pub max_listing_items: u64,

    /// Settings applied to new organizations unless overridden
    pub default_settings: GovernanceSettings,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

impl ClientConfig {
    /// Create a new configuration for the specified network
    pub fn new(network: Network) -> Self {
        Self {
            network,
            rpc_url: network.default_rpc_url().to_string(),
            chain_id: network.chain_id(),
            factory_address: network.default_factory_address().to_string(),
            signer_address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
            backend: BackendKind::Rpc,
            request_timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_initial_delay_ms: 100,
            retry_max_delay_ms: 5000,
            retry_multiplier: 2.0,
            confirmation_poll_interval_ms: 1000,
            confirmation_timeout_secs: 60,
            listing_concurrency: 4,
            max_listing_items: DEFAULT_MAX_LISTED_ITEMS,
            default_settings: GovernanceSettings::default(),
        }
    }

    /// Configuration for a local development chain
    pub fn local() -> Self {
        Self::new(Network::Local)
    }

    /// Configuration for Sepolia
    pub fn sepolia() -> Self {
        Self::new(Network::Sepolia)
    }

    /// In-process simulated chain, no network access
    pub fn simulated() -> Self {
        Self::local().with_backend(BackendKind::Local)
    }

    /// Create a custom configuration
    pub fn custom(rpc_url: String, chain_id: u64, factory_address: String) -> Result<Self> {
        if rpc_url.is_empty() {
            return Err(GovernanceError::Config("RPC URL cannot be empty".to_string()));
        }
        if factory_address.is_empty() {
            return Err(GovernanceError::Config(
                "Factory address cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            rpc_url,
            chain_id,
            factory_address,
            ..Self::new(Network::Custom)
        })
    }

    /// Load configuration from a TOML file; missing fields keep their defaults
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GovernanceError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)
            .map_err(|e| GovernanceError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Local defaults overlaid with `DAO_WORLD_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::local();

        if let Ok(url) = std::env::var("DAO_WORLD_RPC_URL") {
            config.rpc_url = url;
            config.network = Network::Custom;
        }
        if let Ok(factory) = std::env::var("DAO_WORLD_FACTORY") {
            config.factory_address = factory;
        }
        if let Ok(chain_id) = std::env::var("DAO_WORLD_CHAIN_ID") {
            config.chain_id = chain_id.parse().map_err(|_| {
                GovernanceError::Config(format!("Invalid DAO_WORLD_CHAIN_ID: {}", chain_id))
            })?;
        }
        if let Ok(backend) = std::env::var("DAO_WORLD_BACKEND") {
            config.backend = match backend.to_lowercase().as_str() {
                "rpc" => BackendKind::Rpc,
                "local" => BackendKind::Local,
                other => {
                    return Err(GovernanceError::Config(format!(
                        "Unknown DAO_WORLD_BACKEND: {}",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Set backend implementation
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set maximum retries for read calls
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set retry delays
    pub fn with_retry_config(
        mut self,
        initial_delay_ms: u64,
        max_delay_ms: u64,
        multiplier: f64,
    ) -> Self {
        self.retry_initial_delay_ms = initial_delay_ms;
        self.retry_max_delay_ms = max_delay_ms;
        self.retry_multiplier = multiplier;
        self
    }

    /// Set confirmation polling configuration
    pub fn with_confirmation_config(mut self, poll_interval_ms: u64, timeout_secs: u64) -> Self {
        self.confirmation_poll_interval_ms = poll_interval_ms;
        self.confirmation_timeout_secs = timeout_secs;
        self
    }

    /// Set listing concurrency
    pub fn with_listing_concurrency(mut self, concurrency: usize) -> Self {
        self.listing_concurrency = concurrency;
        self
    }

    /// Set the largest item count a listing accepts
    pub fn with_max_listing_items(mut self, max_items: u64) -> Self {
        self.max_listing_items = max_items;
        self
    }

    /// Set default governance settings for new organizations
    pub fn with_default_settings(mut self, settings: GovernanceSettings) -> Self {
        self.default_settings = settings;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.backend == BackendKind::Rpc {
            if self.rpc_url.is_empty() {
                return Err(GovernanceError::Config("RPC URL cannot be empty".to_string()));
            }
            url::Url::parse(&self.rpc_url)?;
            if self.factory_address.is_empty() {
                return Err(GovernanceError::Config(
                    "Factory address cannot be empty".to_string(),
                ));
            }
        }
        if self.max_retries > 0 {
            if self.retry_initial_delay_ms == 0 {
                return Err(GovernanceError::Config(
                    "Retry initial delay must be greater than 0".to_string(),
                ));
            }
            if self.retry_multiplier <= 1.0 {
                return Err(GovernanceError::Config(
                    "Retry multiplier must be greater than 1.0".to_string(),
                ));
            }
        }
        if self.confirmation_poll_interval_ms == 0 {
            return Err(GovernanceError::Config(
                "Confirmation poll interval must be greater than 0".to_string(),
            ));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(GovernanceError::Config(
                "Confirmation timeout must be greater than 0".to_string(),
            ));
        }
        if self.listing_concurrency == 0 {
            return Err(GovernanceError::Config(
                "Listing concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_listing_items == 0 {
            return Err(GovernanceError::Config(
                "Max listing items must be at least 1".to_string(),
            ));
        }
        self.default_settings
            .validate()
            .map_err(|e| GovernanceError::Config(format!("Default settings: {}", e)))?;

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::local()
    }
}
