//! Chain configuration for the sync engine.
//!
//! Provides chain-specific SpokePool addresses and scan parameters for the
//! networks the tracker monitors (mainnet, testnet, or fully custom entries).

use crate::ConfigError;
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

const fn default_max_concurrency() -> usize {
    4
}

/// Network type (mainnet or testnet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    Mainnet,
    Testnet,
}

/// One monitored chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,
    /// Human-readable name used in logs and metric labels
    pub name: String,
    /// JSON-RPC endpoint url
    pub rpc_url: String,
    /// Across SpokePool contract address
    pub spoke_pool: Address,
    /// First block the sync loop scans on a fresh start
    pub lower_bound_block: u64,
    /// Maximum concurrent RPC calls against `rpc_url`
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl ChainConfig {
    /// Ethereum mainnet.
    pub fn ethereum_mainnet(rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id: 1,
            name: "ethereum".to_string(),
            rpc_url: rpc_url.into(),
            // https://etherscan.io/address/0x5c7BCd6E7De5423a257D81B442095A1a6ced35C5
            spoke_pool: address!("0x5c7BCd6E7De5423a257D81B442095A1a6ced35C5"),
            lower_bound_block: 0,
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Ethereum Sepolia testnet.
    pub fn sepolia(rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id: 11155111,
            name: "sepolia".to_string(),
            rpc_url: rpc_url.into(),
            // https://sepolia.etherscan.io/address/0x5ef6C01E11889d86803e0B23e3cB3F9E9d97B662
            spoke_pool: address!("0x5ef6C01E11889d86803e0B23e3cB3F9E9d97B662"),
            lower_bound_block: 0,
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Unichain mainnet.
    pub fn unichain_mainnet(rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id: 130,
            name: "unichain".to_string(),
            rpc_url: rpc_url.into(),
            // https://uniscan.xyz/address/0x09aea4b2242abC8bb4BB78D537A67a245A7bEC64
            spoke_pool: address!("0x09aea4b2242abC8bb4BB78D537A67a245A7bEC64"),
            lower_bound_block: 0,
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Unichain Sepolia testnet.
    pub fn unichain_sepolia(rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id: 1301,
            name: "unichain-sepolia".to_string(),
            rpc_url: rpc_url.into(),
            // https://uniscan.xyz/address/0x6999526e507Cc3b03b180BbE05E1Ff938259A874
            spoke_pool: address!("0x6999526e507Cc3b03b180BbE05E1Ff938259A874"),
            lower_bound_block: 0,
            max_concurrency: default_max_concurrency(),
        }
    }

    /// Default chain pair for a network type: the L1 and Unichain.
    pub fn defaults_for(
        network_type: NetworkType,
        l1_rpc_url: impl Into<String>,
        l2_rpc_url: impl Into<String>,
    ) -> Vec<Self> {
        match network_type {
            NetworkType::Mainnet => vec![
                Self::ethereum_mainnet(l1_rpc_url),
                Self::unichain_mainnet(l2_rpc_url),
            ],
            NetworkType::Testnet => vec![Self::sepolia(l1_rpc_url), Self::unichain_sepolia(l2_rpc_url)],
        }
    }

    /// Override the lower-bound block.
    pub const fn with_lower_bound(mut self, block: u64) -> Self {
        self.lower_bound_block = block;
        self
    }

    /// Override the RPC concurrency cap.
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Override the SpokePool address.
    pub const fn with_spoke_pool(mut self, address: Address) -> Self {
        self.spoke_pool = address;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Zero("max_concurrency"));
        }
        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.rpc_url.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate_chains;

    #[test]
    fn test_mainnet_defaults() {
        let chains = ChainConfig::defaults_for(NetworkType::Mainnet, "http://l1", "http://l2");
        assert_eq!(chains[0].chain_id, 1);
        assert_eq!(chains[1].chain_id, 130);
        assert!(validate_chains(&chains).is_ok());
    }

    #[test]
    fn test_sepolia_defaults() {
        let chains = ChainConfig::defaults_for(NetworkType::Testnet, "http://l1", "http://l2");
        assert_eq!(chains[0].chain_id, 11155111);
        assert_eq!(chains[1].chain_id, 1301);
    }

    #[test]
    fn test_custom_overrides() {
        let custom_spoke_pool = address!("1111111111111111111111111111111111111111");

        let chain = ChainConfig::ethereum_mainnet("https://rpc")
            .with_spoke_pool(custom_spoke_pool)
            .with_lower_bound(21_000_000)
            .with_max_concurrency(2);

        assert_eq!(chain.spoke_pool, custom_spoke_pool);
        assert_eq!(chain.lower_bound_block, 21_000_000);
        assert_eq!(chain.max_concurrency, 2);
    }

    #[test]
    fn test_duplicate_chain_rejected() {
        let chains = vec![
            ChainConfig::ethereum_mainnet("http://a"),
            ChainConfig::ethereum_mainnet("http://b"),
        ];
        assert_eq!(validate_chains(&chains), Err(ConfigError::DuplicateChain(1)));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let chain = ChainConfig::ethereum_mainnet("http://a").with_max_concurrency(0);
        assert_eq!(chain.validate(), Err(ConfigError::Zero("max_concurrency")));
    }

    #[test]
    fn test_empty_chain_list_rejected() {
        assert_eq!(validate_chains(&[]), Err(ConfigError::NoChains));
    }

    #[test]
    fn test_deserialize_with_default_concurrency() {
        let chain: ChainConfig = toml::from_str(
            r#"
            chain_id = 10
            name = "optimism"
            rpc_url = "https://mainnet.optimism.io"
            spoke_pool = "0x6f26Bf09B1C792e3228e5467807a900A503c0281"
            lower_bound_block = 100
            "#,
        )
        .unwrap();
        assert_eq!(chain.max_concurrency, 4);
        assert_eq!(chain.lower_bound_block, 100);
    }
}
