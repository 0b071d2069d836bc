//! Tunables for the sync engine, indexer client and resolver.
//!
//! Every struct deserializes with defaults so a config file only needs the
//! values it overrides.

use crate::ConfigError;
use alloy_primitives::{
    utils::{parse_units, ParseUnits},
    U256,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Decimals of the canonical fixed-point scale (1e18).
pub const FIXED_POINT_DECIMALS: u8 = 18;

/// Sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Seconds between scan ticks per chain
    pub poll_interval_secs: u64,
    /// Blocks per `eth_getLogs` request
    pub chunk_size: u64,
    /// Retries per chunk before the scan is abandoned for this tick
    pub chunk_retries: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            chunk_size: 9_500,
            chunk_retries: 2,
        }
    }
}

impl SyncSettings {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Zero("sync.poll_interval_secs"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero("sync.chunk_size"));
        }
        Ok(())
    }
}

/// Indexer client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerSettings {
    /// Base url of the indexer REST API, without trailing slash
    pub base_url: String,
    /// Seconds between refetches of a non-terminal deposit
    pub refetch_interval_secs: u64,
    /// Immediate retries for retryable failures
    pub max_retries: usize,
    /// Base delay of the exponential retry backoff
    pub retry_base_delay_ms: u64,
    /// Start indexer tracking for every deposit the chains report
    pub auto_track: bool,
    /// Seconds a fetched limits entry stays fresh
    pub limits_ttl_secs: u64,
    /// Seconds between fee quote and limits refreshes for pending deposits
    pub quote_refresh_secs: u64,
    /// Deposit transaction hashes to track from startup
    pub track_tx_hashes: Vec<String>,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://app.across.to/api".to_string(),
            refetch_interval_secs: 10,
            max_retries: 3,
            retry_base_delay_ms: 200,
            auto_track: true,
            limits_ttl_secs: 300,
            quote_refresh_secs: 60,
            track_tx_hashes: Vec::new(),
        }
    }
}

impl IndexerSettings {
    pub const fn refetch_interval(&self) -> Duration {
        Duration::from_secs(self.refetch_interval_secs)
    }

    pub const fn limits_ttl(&self) -> Duration {
        Duration::from_secs(self.limits_ttl_secs)
    }

    pub const fn quote_refresh(&self) -> Duration {
        Duration::from_secs(self.quote_refresh_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refetch_interval_secs == 0 {
            return Err(ConfigError::Zero("indexer.refetch_interval_secs"));
        }
        if self.quote_refresh_secs == 0 {
            return Err(ConfigError::Zero("indexer.quote_refresh_secs"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Seconds a pending deposit may wait before it can count as delayed
    pub delay_threshold_secs: u64,
    /// Decimal tolerance multiplier applied to the quoted fee, e.g. "1.2"
    pub deviation_buffer_multiplier: String,
    /// Seconds between re-evaluations of time-driven flags
    pub reevaluate_interval_secs: u64,
    /// Seconds facts for unknown deposits and applied fact ids are remembered
    pub parked_retention_secs: u64,
    /// Most unknown deposits with parked facts
    pub max_parked: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            delay_threshold_secs: 240,
            deviation_buffer_multiplier: "1.2".to_string(),
            reevaluate_interval_secs: 15,
            parked_retention_secs: 3600,
            max_parked: 10_000,
        }
    }
}

impl ResolverSettings {
    pub const fn delay_threshold(&self) -> Duration {
        Duration::from_secs(self.delay_threshold_secs)
    }

    pub const fn reevaluate_interval(&self) -> Duration {
        Duration::from_secs(self.reevaluate_interval_secs)
    }

    pub const fn parked_retention(&self) -> Duration {
        Duration::from_secs(self.parked_retention_secs)
    }

    /// The multiplier as a 1e18 fixed-point integer. Must be strictly above 1.
    pub fn multiplier_fixed(&self) -> Result<U256, ConfigError> {
        let raw = self.deviation_buffer_multiplier.trim();
        let invalid = |reason: String| {
            ConfigError::InvalidMultiplier(self.deviation_buffer_multiplier.clone(), reason)
        };

        let value = match parse_units(raw, FIXED_POINT_DECIMALS).map_err(|e| invalid(e.to_string()))? {
            ParseUnits::U256(value) => value,
            ParseUnits::I256(_) => return Err(invalid("negative".to_string())),
        };

        let one = U256::from(10u64).pow(U256::from(FIXED_POINT_DECIMALS));
        if value <= one {
            return Err(invalid("must be greater than 1".to_string()));
        }

        Ok(value)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reevaluate_interval_secs == 0 {
            return Err(ConfigError::Zero("resolver.reevaluate_interval_secs"));
        }
        if self.parked_retention_secs == 0 {
            return Err(ConfigError::Zero("resolver.parked_retention_secs"));
        }
        if self.max_parked == 0 {
            return Err(ConfigError::Zero("resolver.max_parked"));
        }
        self.multiplier_fixed()?;
        Ok(())
    }
}
