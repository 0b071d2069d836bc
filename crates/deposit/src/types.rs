//! Shared deposit data model.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 1e18, the scale of every percentage and multiplier in the tracker.
pub const FIXED_POINT_SCALE: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Natural key of a deposit: `(originChainId, depositId)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepositKey {
    pub origin_chain_id: u64,
    pub deposit_id: U256,
}

impl DepositKey {
    pub const fn new(origin_chain_id: u64, deposit_id: U256) -> Self {
        Self {
            origin_chain_id,
            deposit_id,
        }
    }
}

impl fmt::Display for DepositKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin_chain_id, self.deposit_id)
    }
}

/// Lifecycle status. Moves only forward, from `Pending` to one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DepositStatus {
    Pending,
    Filled,
    Expired,
    Refunded,
}

impl DepositStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Filled => "filled",
            Self::Expired => "expired",
            Self::Refunded => "refunded",
        }
    }

    /// Normalize an indexer status string.
    ///
    /// `unfilled` and `slowFillRequested` are pending; unknown values are treated as
    /// pending so they can never freeze a record.
    pub fn from_indexer(status: &str) -> Self {
        match status {
            "filled" => Self::Filled,
            "expired" => Self::Expired,
            "refunded" => Self::Refunded,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fee percentage in 1e18 fixed point (1e18 = 100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeePct(pub U256);

impl FeePct {
    pub const ZERO: Self = Self(U256::ZERO);

    pub const fn new(raw: U256) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> U256 {
        self.0
    }

    /// Fee implied by the amounts of a same-token deposit: `(input - output) / input`.
    ///
    /// Returns `None` when the input is zero or the output exceeds it.
    pub fn from_amounts(input_amount: U256, output_amount: U256) -> Option<Self> {
        if input_amount.is_zero() || output_amount > input_amount {
            return None;
        }
        let fee = (input_amount - output_amount).checked_mul(FIXED_POINT_SCALE)?;
        Some(Self(fee / input_amount))
    }
}

/// Route a limits entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub token: Address,
    pub origin_chain_id: u64,
    pub destination_chain_id: u64,
}

/// Liquidity limits of one route, in the token's smallest denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Limits {
    pub min_deposit: U256,
    pub max_deposit: U256,
    pub max_deposit_instant: U256,
    pub max_deposit_short_delay: U256,
}

/// Point-in-time snapshot of a deposit as the indexer reports it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexerObservation {
    pub status: Option<DepositStatus>,
    pub deposit_block_timestamp: Option<u64>,
    pub fill_block_timestamp: Option<u64>,
    pub bridge_fee_usd: Option<String>,
    pub fill_tx_hash: Option<B256>,
}

impl IndexerObservation {
    pub fn status(&self) -> DepositStatus {
        self.status.unwrap_or(DepositStatus::Pending)
    }
}

/// A cross-chain deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub key: DepositKey,
    pub destination_chain_id: u64,
    pub depositor: Address,
    pub recipient: Address,
    pub input_token: Address,
    pub output_token: Address,
    pub input_amount: U256,
    pub output_amount: U256,
    /// Unix seconds of the deposit block
    pub deposit_timestamp: u64,
    /// Unix seconds after which the deposit can no longer be filled
    pub fill_deadline: u64,
    pub deposit_tx_hash: Option<B256>,
    /// Relayer fee the depositor agreed to
    pub quoted_relayer_fee_pct: Option<FeePct>,
    /// Live relayer fee quote for the same route and amount
    pub suggested_relayer_fee_pct: Option<FeePct>,
    pub status: DepositStatus,
    pub fill_tx_hash: Option<B256>,
    pub fill_timestamp: Option<u64>,
}

impl Deposit {
    pub const fn route(&self) -> Route {
        Route {
            token: self.input_token,
            origin_chain_id: self.key.origin_chain_id,
            destination_chain_id: self.destination_chain_id,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexer_status_normalization() {
        assert_eq!(DepositStatus::from_indexer("filled"), DepositStatus::Filled);
        assert_eq!(DepositStatus::from_indexer("unfilled"), DepositStatus::Pending);
        assert_eq!(DepositStatus::from_indexer("pending"), DepositStatus::Pending);
        assert_eq!(
            DepositStatus::from_indexer("slowFillRequested"),
            DepositStatus::Pending
        );
        assert_eq!(DepositStatus::from_indexer("refunded"), DepositStatus::Refunded);
        assert_eq!(DepositStatus::from_indexer("expired"), DepositStatus::Expired);
        assert_eq!(DepositStatus::from_indexer("something-new"), DepositStatus::Pending);
    }

    #[test]
    fn test_only_pending_is_non_terminal() {
        assert!(!DepositStatus::Pending.is_terminal());
        assert!(DepositStatus::Filled.is_terminal());
        assert!(DepositStatus::Expired.is_terminal());
        assert!(DepositStatus::Refunded.is_terminal());
    }

    #[test]
    fn test_fee_from_amounts() {
        // 1% of 1_000_000
        let fee = FeePct::from_amounts(U256::from(1_000_000), U256::from(990_000)).unwrap();
        assert_eq!(fee.raw(), FIXED_POINT_SCALE / U256::from(100));

        assert_eq!(
            FeePct::from_amounts(U256::from(100), U256::from(100)),
            Some(FeePct::ZERO)
        );
        assert_eq!(FeePct::from_amounts(U256::ZERO, U256::ZERO), None);
        assert_eq!(FeePct::from_amounts(U256::from(100), U256::from(200)), None);
    }

    #[test]
    fn test_key_display() {
        let key = DepositKey::new(1, U256::from(42));
        assert_eq!(key.to_string(), "1:42");
    }
}
