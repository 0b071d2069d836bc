//! Configuration types for the deposit tracker.
//!
//! This crate provides:
//! - Chain configurations with SpokePool addresses and scan lower bounds
//! - Typed settings for the sync engine, indexer client and resolver
//! - Validation of the above

pub mod network;
pub mod settings;

pub use network::{ChainConfig, NetworkType};
pub use settings::{IndexerSettings, ResolverSettings, SyncSettings};

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// No chain configured for syncing
    #[error("at least one chain must be configured")]
    NoChains,

    /// Two chain entries share a chain id
    #[error("duplicate chain id {0}")]
    DuplicateChain(u64),

    /// A numeric setting that must be positive is zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// Deviation buffer multiplier is unparseable or not above 1
    #[error("invalid deviation buffer multiplier {0:?}: {1}")]
    InvalidMultiplier(String, String),

    /// Malformed URL
    #[error("invalid url {0:?}")]
    InvalidUrl(String),
}

/// Validate a list of chain configurations.
pub fn validate_chains(chains: &[ChainConfig]) -> Result<(), ConfigError> {
    if chains.is_empty() {
        return Err(ConfigError::NoChains);
    }

    let mut seen = std::collections::HashSet::new();
    for chain in chains {
        if !seen.insert(chain.chain_id) {
            return Err(ConfigError::DuplicateChain(chain.chain_id));
        }
        chain.validate()?;
    }

    Ok(())
}
