use alloy_primitives::B256;
use config::{validate_chains, ChainConfig, IndexerSettings, ResolverSettings, SyncSettings};
use deposit::{ResolverConfig, Retention};
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr};

const fn default_metrics_port() -> u16 {
    9090
}

/// Top-level tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port of the Prometheus exporter
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Chains to sync
    pub chains: Vec<ChainConfig>,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub indexer: IndexerSettings,

    #[serde(default)]
    pub resolver: ResolverSettings,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate a TOML document.
    pub fn parse(contents: &str) -> eyre::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        validate_chains(&self.chains)?;
        self.sync.validate()?;
        self.indexer.validate()?;
        self.resolver.validate()?;
        self.track_tx_hashes()?;
        Ok(())
    }

    pub fn resolver_config(&self) -> eyre::Result<ResolverConfig> {
        Ok(ResolverConfig {
            delay_threshold: self.resolver.delay_threshold(),
            deviation_buffer_multiplier: self.resolver.multiplier_fixed()?,
            retention: Retention {
                ttl: self.resolver.parked_retention(),
                max_parked: self.resolver.max_parked,
            },
        })
    }

    /// Deposit transaction hashes to track from startup.
    pub fn track_tx_hashes(&self) -> eyre::Result<Vec<B256>> {
        self.indexer
            .track_tx_hashes
            .iter()
            .map(|hash| {
                B256::from_str(hash).map_err(|e| eyre::eyre!("invalid tx hash {hash:?}: {e}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    const MINIMAL: &str = r#"
        [[chains]]
        chain_id = 1
        name = "ethereum"
        rpc_url = "http://localhost:8545"
        spoke_pool = "0x5c7BCd6E7De5423a257D81B442095A1a6ced35C5"
        lower_bound_block = 21000000
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.chains[0].max_concurrency, 4);
        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.indexer.refetch_interval_secs, 10);

        let resolver = config.resolver_config().unwrap();
        assert_eq!(
            resolver.deviation_buffer_multiplier,
            U256::from(1_200_000_000_000_000_000u64)
        );
    }

    #[test]
    fn test_overrides_and_validation() {
        let config = Config::parse(&format!(
            "{MINIMAL}\n[resolver]\ndeviation_buffer_multiplier = \"1.05\"\n[sync]\nchunk_size = 2000\n"
        ))
        .unwrap();
        assert_eq!(config.sync.chunk_size, 2000);
        assert_eq!(config.sync.poll_interval_secs, 10);

        let bad_multiplier = format!("{MINIMAL}\n[resolver]\ndeviation_buffer_multiplier = \"0.9\"\n");
        assert!(Config::parse(&bad_multiplier).is_err());

        let no_chains = "metrics_port = 1\nchains = []\n";
        assert!(Config::parse(no_chains).is_err());

        let bad_hash = format!("{MINIMAL}\n[indexer]\ntrack_tx_hashes = [\"0x12\"]\n");
        assert!(Config::parse(&bad_hash).is_err());
    }
}
