//! Scripted chain for tests: SpokePool log builders and an in-memory RPC transport.

use alloy_primitives::{Address, Bytes, LogData, B256, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::SolEvent;
use binding::across::{
    FillType,
    ISpokePool::{FilledRelay, FundsDeposited},
    V3RelayExecutionEventInfo,
};
use client::{GatewayError, RpcTransport};
use serde_json::{json, Value};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex,
};

/// SpokePool address used by the builders.
pub const SPOKE_POOL: Address = Address::repeat_byte(0x5c);

/// Block timestamps are `BLOCK_TIME_BASE + block`.
pub const BLOCK_TIME_BASE: u64 = 1_700_000_000;

fn rpc_log(data: LogData, block: u64, tx_byte: u8, log_index: u64) -> Log {
    Log {
        inner: alloy_primitives::Log {
            address: SPOKE_POOL,
            data,
        },
        block_number: Some(block),
        block_timestamp: Some(BLOCK_TIME_BASE + block),
        transaction_hash: Some(B256::repeat_byte(tx_byte)),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// A `FundsDeposited` log of 1_000_000 in, 990_000 out.
pub fn deposit_log(
    deposit_id: u64,
    destination_chain_id: u64,
    block: u64,
    tx_byte: u8,
    log_index: u64,
) -> Log {
    let event = FundsDeposited {
        inputToken: B256::left_padding_from(&[0x04; 20]),
        outputToken: B256::left_padding_from(&[0x05; 20]),
        inputAmount: U256::from(1_000_000),
        outputAmount: U256::from(990_000),
        destinationChainId: U256::from(destination_chain_id),
        depositId: U256::from(deposit_id),
        quoteTimestamp: 0,
        fillDeadline: (BLOCK_TIME_BASE + block + 21_600) as u32,
        exclusivityDeadline: 0,
        depositor: B256::left_padding_from(&[0x02; 20]),
        recipient: B256::left_padding_from(&[0x03; 20]),
        exclusiveRelayer: B256::ZERO,
        message: Bytes::new(),
    };
    rpc_log(event.encode_log_data(), block, tx_byte, log_index)
}

/// A `FilledRelay` log for `(origin_chain_id, deposit_id)`.
pub fn fill_log(
    origin_chain_id: u64,
    deposit_id: u64,
    block: u64,
    tx_byte: u8,
    log_index: u64,
) -> Log {
    let event = FilledRelay {
        inputToken: B256::left_padding_from(&[0x04; 20]),
        outputToken: B256::left_padding_from(&[0x05; 20]),
        inputAmount: U256::from(1_000_000),
        outputAmount: U256::from(990_000),
        repaymentChainId: U256::from(origin_chain_id),
        originChainId: U256::from(origin_chain_id),
        depositId: U256::from(deposit_id),
        fillDeadline: 0,
        exclusivityDeadline: 0,
        exclusiveRelayer: B256::ZERO,
        relayer: B256::left_padding_from(&[0x07; 20]),
        depositor: B256::left_padding_from(&[0x02; 20]),
        recipient: B256::left_padding_from(&[0x03; 20]),
        messageHash: B256::ZERO,
        relayExecutionInfo: V3RelayExecutionEventInfo {
            updatedRecipient: B256::ZERO,
            updatedMessageHash: B256::ZERO,
            updatedOutputAmount: U256::from(990_000),
            fillType: FillType::FastFill,
        },
    };
    rpc_log(event.encode_log_data(), block, tx_byte, log_index)
}

#[derive(Default)]
struct MockChainState {
    head: AtomicU64,
    logs: Mutex<Vec<Log>>,
    fail_get_logs: AtomicBool,
    get_logs_calls: AtomicUsize,
    ranges: Mutex<Vec<(u64, u64)>>,
}

/// In-memory chain answering `eth_blockNumber` and `eth_getLogs`.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<MockChainState>,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        let chain = Self::default();
        chain.set_head(head);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.state.head.store(head, Ordering::SeqCst);
    }

    pub fn push_log(&self, log: Log) {
        self.state.logs.lock().unwrap().push(log);
    }

    /// Make every `eth_getLogs` call fail until reset.
    pub fn fail_get_logs(&self, fail: bool) {
        self.state.fail_get_logs.store(fail, Ordering::SeqCst);
    }

    pub fn get_logs_calls(&self) -> usize {
        self.state.get_logs_calls.load(Ordering::SeqCst)
    }

    /// Block ranges requested so far, in request order.
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.state.ranges.lock().unwrap().clone()
    }

    fn get_logs(&self, params: &Value) -> Result<Value, GatewayError> {
        self.state.get_logs_calls.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_get_logs.load(Ordering::SeqCst) {
            return Err(GatewayError::Rpc {
                method: "eth_getLogs".to_string(),
                message: "upstream unavailable".to_string(),
            });
        }

        let block = |field: &str| {
            params[0][field]
                .as_str()
                .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
                .unwrap_or_default()
        };
        let (from, to) = (block("fromBlock"), block("toBlock"));
        self.state.ranges.lock().unwrap().push((from, to));

        let logs: Vec<Log> = self
            .state
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| log.block_number.is_some_and(|b| b >= from && b <= to))
            .cloned()
            .collect();

        serde_json::to_value(logs).map_err(|e| GatewayError::Decode {
            method: "eth_getLogs".to_string(),
            message: e.to_string(),
        })
    }
}

impl RpcTransport for MockChain {
    async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        match method {
            "eth_blockNumber" => Ok(json!(format!(
                "{:#x}",
                self.state.head.load(Ordering::SeqCst)
            ))),
            "eth_getLogs" => self.get_logs(&params),
            other => Err(GatewayError::Rpc {
                method: other.to_string(),
                message: "method not supported by mock".to_string(),
            }),
        }
    }
}
