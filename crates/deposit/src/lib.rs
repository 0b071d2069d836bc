//! Deposit tracking for Across Protocol.
//!
//! This crate holds the shared deposit model and decides what a deposit's status is.
//! Facts from chain scans and from the indexer are applied to a [`DepositBook`] keyed
//! by `(originChainId, depositId)`; [`resolve`] turns a record into a [`Resolution`].

pub mod book;
pub mod fact;
pub mod resolver;
pub mod service;
pub mod types;

pub use book::{Applied, DepositBook, Entry, Retention};
pub use fact::{ChainFact, Fact, FactId, FillInfo};
pub use resolver::{resolve, Resolution, ResolverConfig};
pub use service::{
    system_clock, Clock, DepositView, ResolverHandle, ResolverService, StatusUpdate,
};
pub use types::{
    Deposit, DepositKey, DepositStatus, FeePct, IndexerObservation, Limits, Route,
    FIXED_POINT_SCALE,
};

/// Deposit and fact builders for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use crate::{
        fact::{ChainFact, FactId, FillInfo},
        types::{Deposit, DepositKey, DepositStatus, IndexerObservation},
    };
    use alloy_primitives::{Address, B256, U256};

    /// A pending deposit from chain 1 to chain 130.
    pub fn mock_deposit(id: u64) -> Deposit {
        Deposit {
            key: DepositKey::new(1, U256::from(id)),
            destination_chain_id: 130,
            depositor: Address::from([2u8; 20]),
            recipient: Address::from([3u8; 20]),
            input_token: Address::from([4u8; 20]),
            output_token: Address::from([5u8; 20]),
            input_amount: U256::from(1_000_000),
            output_amount: U256::from(990_000),
            deposit_timestamp: 1_000,
            fill_deadline: 1_000 + 6 * 3600,
            deposit_tx_hash: Some(B256::repeat_byte(0xd0)),
            quoted_relayer_fee_pct: None,
            suggested_relayer_fee_pct: None,
            status: DepositStatus::Pending,
            fill_tx_hash: None,
            fill_timestamp: None,
        }
    }

    pub fn created(deposit: Deposit, log_index: u64) -> ChainFact {
        ChainFact::DepositCreated {
            id: FactId::new(B256::repeat_byte(0xd0), log_index),
            deposit: Box::new(deposit),
        }
    }

    pub fn filled(key: DepositKey, log_index: u64) -> ChainFact {
        ChainFact::DepositFilled {
            id: FactId::new(B256::repeat_byte(0xf1), log_index),
            key,
            fill: FillInfo {
                fill_tx_hash: B256::repeat_byte(0xf1),
                fill_timestamp: Some(1_060),
            },
        }
    }

    pub fn observation(status: DepositStatus) -> IndexerObservation {
        IndexerObservation {
            status: Some(status),
            ..Default::default()
        }
    }
}
