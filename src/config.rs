//! Account configuration.
//!
//! Loaded from the TOML file named by `CONFIG_FILE` (default `account.toml`).
//! A missing file yields the defaults; a malformed one is an error.

use alloy::primitives::{Address, address};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// ERC-4337 v0.7 entry point.
pub const DEFAULT_ENTRY_POINT: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// Complete account configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Address of the account itself; the EIP-712 verifying contract.
    pub account: Address,
    pub chain_id: u64,
    /// The only caller allowed to run `validateUserOp` and `executeUserOp`.
    pub entry_point: Address,
    pub domain: DomainConfig,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            account: Address::ZERO,
            chain_id: 1,
            entry_point: DEFAULT_ENTRY_POINT,
            domain: DomainConfig::default(),
        }
    }
}

/// EIP-712 domain used for deferred-action digests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DomainConfig {
    pub name: String,
    pub version: String,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            name: "ModularAccount".to_string(),
            version: "1".to_string(),
        }
    }
}

impl AccountConfig {
    /// Load configuration from a TOML file.
    ///
    /// If the file doesn't exist, returns the default configuration.
    /// If the file exists but is malformed, returns an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from environment variable CONFIG_FILE or default path.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "account.toml".to_string());
        Self::from_file(config_path)
    }

    pub fn with_account(mut self, account: Address) -> Self {
        self.account = account;
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }
}
