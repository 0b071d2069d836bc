//! Decoding of SpokePool logs into deposit facts.

use alloy_primitives::Address;
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use binding::across::ISpokePool::{FilledRelay, FundsDeposited};
use deposit::{ChainFact, Deposit, DepositKey, DepositStatus, FactId, FeePct, FillInfo};
use tracing::debug;

/// Decode one log seen on `chain_id`. Logs that are not deposit events, were
/// removed by a reorg, or lack position data yield `None`.
pub fn decode_log(chain_id: u64, log: &Log) -> Option<ChainFact> {
    if log.removed {
        return None;
    }

    let id = FactId::new(log.transaction_hash?, log.log_index?);
    let topic0 = *log.inner.data.topics().first()?;

    if topic0 == FundsDeposited::SIGNATURE_HASH {
        decode_deposit(chain_id, id, log)
    } else if topic0 == FilledRelay::SIGNATURE_HASH {
        decode_fill(id, log)
    } else {
        None
    }
}

fn decode_deposit(chain_id: u64, id: FactId, log: &Log) -> Option<ChainFact> {
    let event = match log.log_decode::<FundsDeposited>() {
        Ok(decoded) => decoded.inner.data,
        Err(e) => {
            debug!(chain_id, tx = %id.tx_hash, error = %e, "Skipping undecodable FundsDeposited log");
            return None;
        }
    };

    let Ok(destination_chain_id) = u64::try_from(event.destinationChainId) else {
        debug!(chain_id, tx = %id.tx_hash, "Skipping deposit with out-of-range destination chain");
        return None;
    };

    let deposit = Deposit {
        key: DepositKey::new(chain_id, event.depositId),
        destination_chain_id,
        depositor: Address::from_word(event.depositor),
        recipient: Address::from_word(event.recipient),
        input_token: Address::from_word(event.inputToken),
        output_token: Address::from_word(event.outputToken),
        input_amount: event.inputAmount,
        output_amount: event.outputAmount,
        deposit_timestamp: log
            .block_timestamp
            .unwrap_or_else(|| u64::from(event.quoteTimestamp)),
        fill_deadline: u64::from(event.fillDeadline),
        deposit_tx_hash: Some(id.tx_hash),
        quoted_relayer_fee_pct: FeePct::from_amounts(event.inputAmount, event.outputAmount),
        suggested_relayer_fee_pct: None,
        status: DepositStatus::Pending,
        fill_tx_hash: None,
        fill_timestamp: None,
    };

    Some(ChainFact::DepositCreated {
        id,
        deposit: Box::new(deposit),
    })
}

fn decode_fill(id: FactId, log: &Log) -> Option<ChainFact> {
    let event = match log.log_decode::<FilledRelay>() {
        Ok(decoded) => decoded.inner.data,
        Err(e) => {
            debug!(tx = %id.tx_hash, error = %e, "Skipping undecodable FilledRelay log");
            return None;
        }
    };

    let origin_chain_id = u64::try_from(event.originChainId).ok()?;

    Some(ChainFact::DepositFilled {
        id,
        key: DepositKey::new(origin_chain_id, event.depositId),
        fill: FillInfo {
            fill_tx_hash: id.tx_hash,
            fill_timestamp: log.block_timestamp,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{deposit_log, fill_log};
    use alloy_primitives::{B256, U256};

    #[test]
    fn test_decode_funds_deposited() {
        let log = deposit_log(42, 130, 1_000, 0xaa, 3);

        let Some(ChainFact::DepositCreated { id, deposit }) = decode_log(1, &log) else {
            panic!("expected a deposit fact");
        };
        assert_eq!(id, FactId::new(B256::repeat_byte(0xaa), 3));
        assert_eq!(deposit.key, DepositKey::new(1, U256::from(42)));
        assert_eq!(deposit.destination_chain_id, 130);
        assert_eq!(deposit.status, DepositStatus::Pending);
        assert_eq!(deposit.deposit_tx_hash, Some(B256::repeat_byte(0xaa)));
        // 1% fee between input and output amounts
        assert_eq!(
            deposit.quoted_relayer_fee_pct,
            Some(FeePct::new(U256::from(10_000_000_000_000_000u64)))
        );
    }

    #[test]
    fn test_decode_filled_relay() {
        let log = fill_log(1, 42, 2_000, 0xbb, 0);

        let Some(ChainFact::DepositFilled { key, fill, .. }) = decode_log(130, &log) else {
            panic!("expected a fill fact");
        };
        assert_eq!(key, DepositKey::new(1, U256::from(42)));
        assert_eq!(fill.fill_tx_hash, B256::repeat_byte(0xbb));
    }

    #[test]
    fn test_removed_and_foreign_logs_skipped() {
        let mut removed = deposit_log(1, 130, 10, 0x01, 0);
        removed.removed = true;
        assert!(decode_log(1, &removed).is_none());

        let mut foreign = deposit_log(1, 130, 10, 0x01, 0);
        foreign.inner.data = alloy_primitives::LogData::new_unchecked(
            vec![B256::repeat_byte(0x99)],
            Default::default(),
        );
        assert!(decode_log(1, &foreign).is_none());

        let mut unpositioned = deposit_log(1, 130, 10, 0x01, 0);
        unpositioned.log_index = None;
        assert!(decode_log(1, &unpositioned).is_none());
    }
}
