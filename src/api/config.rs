// Configuration for DAO deployments
//
// Loaded once at startup: defaults, then an optional JSON file, then the
// environment (including a `.env` file). Signing keys are only ever read from
// the environment and never written out.

use std::path::{Path, PathBuf};
use std::fs;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ethers::signers::LocalWallet;
use serde::{Deserialize, Serialize};

use crate::ethereum::NetworkRegistry;
use crate::mint::DEFAULT_MINT_PRICE;
use crate::plan::{AuctionParams, DaoParams};

pub const ENV_NETWORK: &str = "DAO_NETWORK";
pub const ENV_RPC_URL: &str = "DAO_RPC_URL";
pub const ENV_PRIVATE_KEY: &str = "DAO_PRIVATE_KEY";
pub const ENV_ARTIFACTS_DIR: &str = "DAO_ARTIFACTS_DIR";
pub const ENV_STEP_TIMEOUT_SECS: &str = "DAO_STEP_TIMEOUT_SECS";
pub const ENV_CONFIRMATIONS: &str = "DAO_CONFIRMATIONS";

/// Deployment configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Network preset name
    pub network: String,

    /// RPC endpoint; overrides the preset's
    pub rpc_url: Option<String>,

    /// Hardhat artifacts directory
    pub artifacts_dir: PathBuf,

    /// Seconds a step may wait for its receipt before the plan is abandoned
    pub step_timeout_secs: u64,

    /// Receipt polling interval in milliseconds
    pub poll_interval_ms: u64,

    /// Blocks to wait on top of inclusion
    pub confirmations: usize,

    /// Mint price in ether
    pub mint_price: String,

    /// Governance plan parameters
    pub dao: DaoParams,

    /// Auction plan parameters
    pub auction: AuctionParams,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: "localhost".to_string(),
            rpc_url: None,
            artifacts_dir: PathBuf::from("artifacts"),
            step_timeout_secs: 120,
            poll_interval_ms: 1000,
            confirmations: 1,
            mint_price: DEFAULT_MINT_PRICE.to_string(),
            dao: DaoParams::default(),
            auction: AuctionParams::default(),
        }
    }
}

impl DeployConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// RPC endpoint to use: the explicit one, else the network preset's
    pub fn resolve_rpc_url(&self, registry: &NetworkRegistry) -> Result<String> {
        if let Some(url) = &self.rpc_url {
            return Ok(url.clone());
        }
        let network = registry
            .get(&self.network)
            .ok_or_else(|| anyhow!("unknown network {}", self.network))?;
        network.rpc_url.clone().ok_or_else(|| {
            anyhow!(
                "network {} has no public RPC endpoint; set {}",
                self.network,
                ENV_RPC_URL
            )
        })
    }
}

/// Configuration manager for deployments
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<DeployConfig> {
        let config_str = fs::read_to_string(path)?;
        let config = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &DeployConfig, path: P) -> Result<()> {
        let config_str = serde_json::to_string_pretty(config)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Overlay `DAO_*` environment variables, reading `.env` first
    pub fn apply_env(config: DeployConfig) -> Result<DeployConfig> {
        dotenv::dotenv().ok();
        Self::apply_vars(config, |key| std::env::var(key).ok())
    }

    /// Overlay variables from any source
    pub fn apply_vars<F>(mut config: DeployConfig, var: F) -> Result<DeployConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(network) = var(ENV_NETWORK) {
            config.network = network;
        }
        if let Some(url) = var(ENV_RPC_URL) {
            config.rpc_url = Some(url);
        }
        if let Some(dir) = var(ENV_ARTIFACTS_DIR) {
            config.artifacts_dir = PathBuf::from(dir);
        }
        if let Some(secs) = var(ENV_STEP_TIMEOUT_SECS) {
            config.step_timeout_secs = secs
                .parse()
                .with_context(|| format!("{} is not a number of seconds", ENV_STEP_TIMEOUT_SECS))?;
        }
        if let Some(confirmations) = var(ENV_CONFIRMATIONS) {
            config.confirmations = confirmations
                .parse()
                .with_context(|| format!("{} is not a number", ENV_CONFIRMATIONS))?;
        }
        Ok(config)
    }

    /// Signing key of the deployer, from the environment only
    pub fn wallet_from_env() -> Result<LocalWallet> {
        dotenv::dotenv().ok();
        let key = std::env::var(ENV_PRIVATE_KEY)
            .with_context(|| format!("{} not found in environment variables", ENV_PRIVATE_KEY))?;
        key.trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .with_context(|| format!("{} is not a valid private key", ENV_PRIVATE_KEY))
    }

    /// Create a builder for configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for creating configurations
#[derive(Default)]
pub struct ConfigBuilder {
    config: DeployConfig,
}

impl ConfigBuilder {
    /// Set the network preset
    pub fn network(mut self, value: &str) -> Self {
        self.config.network = value.to_string();
        self
    }

    /// Set an explicit RPC endpoint
    pub fn rpc_url(mut self, value: &str) -> Self {
        self.config.rpc_url = Some(value.to_string());
        self
    }

    /// Set the artifacts directory
    pub fn artifacts_dir<P: Into<PathBuf>>(mut self, value: P) -> Self {
        self.config.artifacts_dir = value.into();
        self
    }

    /// Set the per-step confirmation timeout
    pub fn step_timeout_secs(mut self, value: u64) -> Self {
        self.config.step_timeout_secs = value;
        self
    }

    /// Set the number of confirmations to wait for
    pub fn confirmations(mut self, value: usize) -> Self {
        self.config.confirmations = value;
        self
    }

    /// Set the governance plan parameters
    pub fn dao(mut self, value: DaoParams) -> Self {
        self.config.dao = value;
        self
    }

    /// Set the auction plan parameters
    pub fn auction(mut self, value: AuctionParams) -> Self {
        self.config.auction = value;
        self
    }

    /// Build the configuration
    pub fn build(self) -> DeployConfig {
        self.config
    }
}
