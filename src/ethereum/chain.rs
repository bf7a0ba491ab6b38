// Network presets
//
// Networks the DAO has been deployed to. RPC endpoints that need an API key
// carry no default URL; they have to come from the environment.

use std::collections::BTreeMap;

/// Network configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Name used on the command line
    pub name: String,

    /// Chain ID
    pub chain_id: u64,

    /// Public RPC endpoint, if one exists that needs no credentials
    pub rpc_url: Option<String>,

    /// Native currency symbol
    pub currency_symbol: String,
}

impl NetworkConfig {
    pub fn new(name: &str, chain_id: u64, rpc_url: Option<&str>, currency_symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            chain_id,
            rpc_url: rpc_url.map(str::to_string),
            currency_symbol: currency_symbol.to_string(),
        }
    }

    /// Local hardhat or anvil node
    pub fn localhost() -> Self {
        Self::new("localhost", 31337, Some("http://127.0.0.1:8545"), "ETH")
    }

    pub fn goerli() -> Self {
        Self::new("goerli", 5, None, "ETH")
    }

    pub fn bitkub_testnet() -> Self {
        Self::new(
            "bitkub_testnet",
            25925,
            Some("https://rpc-testnet.bitkubchain.io"),
            "KUB",
        )
    }

    pub fn mumbai_testnet() -> Self {
        Self::new(
            "mumbai_testnet",
            80001,
            Some("https://rpc-mumbai.maticvigil.com"),
            "MATIC",
        )
    }
}

/// Network registry for looking up presets by name
pub struct NetworkRegistry {
    networks: BTreeMap<String, NetworkConfig>,
}

impl NetworkRegistry {
    /// Create a registry with the default presets
    pub fn new() -> Self {
        let mut registry = Self {
            networks: BTreeMap::new(),
        };
        registry.add(NetworkConfig::localhost());
        registry.add(NetworkConfig::goerli());
        registry.add(NetworkConfig::bitkub_testnet());
        registry.add(NetworkConfig::mumbai_testnet());
        registry
    }

    pub fn get(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.get(name)
    }

    pub fn by_chain_id(&self, chain_id: u64) -> Option<&NetworkConfig> {
        self.networks.values().find(|network| network.chain_id == chain_id)
    }

    /// Add or replace a preset
    pub fn add(&mut self, network: NetworkConfig) {
        self.networks.insert(network.name.clone(), network);
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.values()
    }
}

impl Default for NetworkRegistry {
    fn default() -> Self {
        Self::new()
    }
}
