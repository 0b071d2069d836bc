//! Facts the resolver consumes.
//!
//! Chain facts carry their natural key `(transactionHash, logIndex)` so replaying a
//! scan range is harmless.

use crate::types::{Deposit, DepositKey, FeePct, IndexerObservation, Limits, Route};
use alloy_primitives::B256;

/// Natural key of an on-chain log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactId {
    pub tx_hash: B256,
    pub log_index: u64,
}

impl FactId {
    pub const fn new(tx_hash: B256, log_index: u64) -> Self {
        Self { tx_hash, log_index }
    }
}

/// A fill observed on a destination chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillInfo {
    pub fill_tx_hash: B256,
    pub fill_timestamp: Option<u64>,
}

/// A deposit event decoded from a chain scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainFact {
    /// `FundsDeposited` on the origin chain
    DepositCreated { id: FactId, deposit: Box<Deposit> },
    /// `FilledRelay` on the destination chain
    DepositFilled {
        id: FactId,
        key: DepositKey,
        fill: FillInfo,
    },
}

impl ChainFact {
    pub const fn id(&self) -> FactId {
        match self {
            Self::DepositCreated { id, .. } | Self::DepositFilled { id, .. } => *id,
        }
    }

    pub fn key(&self) -> DepositKey {
        match self {
            Self::DepositCreated { deposit, .. } => deposit.key,
            Self::DepositFilled { key, .. } => *key,
        }
    }
}

/// Everything the resolver can be told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    Chain(ChainFact),
    /// A fresh indexer snapshot. `deposit` is present when the indexer record is
    /// complete enough to seed a deposit the chains have not reported yet.
    Indexer {
        key: DepositKey,
        observation: IndexerObservation,
        deposit: Option<Box<Deposit>>,
    },
    /// Live relayer fee quote for a deposit.
    SuggestedFee { key: DepositKey, fee: FeePct },
    /// Limits for a route.
    Limits { route: Route, limits: Limits },
}

impl From<ChainFact> for Fact {
    fn from(fact: ChainFact) -> Self {
        Self::Chain(fact)
    }
}
