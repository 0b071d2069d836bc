//! Chunked SpokePool log scans through a [`Gateway`].

use crate::events::decode_log;
use alloy_primitives::{Address, U64};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_sol_types::SolEvent;
use binding::across::ISpokePool::{FilledRelay, FundsDeposited};
use client::{Gateway, GatewayError, RpcTransport};
use deposit::{ChainFact, FactId};
use serde_json::json;
use std::{collections::HashSet, sync::Arc};
use tokio_retry::{strategy::ExponentialBackoff, Retry};
use tracing::{debug, warn};

/// Result of one successful scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub from_block: u64,
    pub head_block: u64,
    /// Decoded facts in block/log order, deduplicated by `(tx hash, log index)`
    pub facts: Vec<ChainFact>,
}

/// Reads deposit and fill logs of one chain's SpokePool.
pub struct ChainScanner<T> {
    chain_id: u64,
    spoke_pool: Address,
    gateway: Arc<Gateway<T>>,
    chunk_size: u64,
    chunk_retries: usize,
}

impl<T> ChainScanner<T>
where
    T: RpcTransport,
{
    pub fn new(
        chain_id: u64,
        spoke_pool: Address,
        gateway: Arc<Gateway<T>>,
        chunk_size: u64,
        chunk_retries: usize,
    ) -> Self {
        Self {
            chain_id,
            spoke_pool,
            gateway,
            chunk_size: chunk_size.max(1),
            chunk_retries,
        }
    }

    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn gateway(&self) -> &Arc<Gateway<T>> {
        &self.gateway
    }

    pub async fn head_block(&self) -> Result<u64, GatewayError> {
        let head: U64 = self.gateway.call("eth_blockNumber", json!([])).await?;
        Ok(head.to())
    }

    /// Scan `[floor, head]`. Any chunk that still fails after its retries fails the
    /// whole scan, so callers never see a partial range.
    pub async fn scan(&self, floor: u64) -> Result<ScanOutcome, GatewayError> {
        let head = self.head_block().await?;

        if head < floor {
            debug!(chain_id = self.chain_id, floor, head, "Head behind sync floor, nothing to scan");
            return Ok(ScanOutcome {
                from_block: floor,
                head_block: head,
                facts: Vec::new(),
            });
        }

        let mut logs = Vec::new();
        let mut current = floor;

        while current <= head {
            let chunk_end = current.saturating_add(self.chunk_size - 1).min(head);
            logs.extend(self.get_logs_with_retry(current, chunk_end).await?);

            let Some(next) = chunk_end.checked_add(1) else {
                break;
            };
            current = next;
        }

        let facts = self.decode(logs);

        debug!(
            chain_id = self.chain_id,
            from = floor,
            to = head,
            facts = facts.len(),
            "Scanned SpokePool logs"
        );

        Ok(ScanOutcome {
            from_block: floor,
            head_block: head,
            facts,
        })
    }

    fn decode(&self, mut logs: Vec<Log>) -> Vec<ChainFact> {
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut seen: HashSet<FactId> = HashSet::new();
        logs.iter()
            .filter_map(|log| decode_log(self.chain_id, log))
            .filter(|fact| seen.insert(fact.id()))
            .collect()
    }

    async fn get_logs_with_retry(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, GatewayError> {
        let retry_strategy = ExponentialBackoff::from_millis(100).take(self.chunk_retries);

        Retry::spawn(retry_strategy, || async {
            self.get_logs(from_block, to_block).await.map_err(|e| {
                warn!(
                    chain_id = self.chain_id,
                    from = from_block,
                    to = to_block,
                    error = %e,
                    "Log chunk scan failed, will retry"
                );
                e
            })
        })
        .await
    }

    async fn get_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, GatewayError> {
        let filter = Filter::new()
            .address(self.spoke_pool)
            .event_signature(vec![
                FundsDeposited::SIGNATURE_HASH,
                FilledRelay::SIGNATURE_HASH,
            ])
            .from_block(from_block)
            .to_block(to_block);

        self.gateway.call("eth_getLogs", json!([filter])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{deposit_log, fill_log, MockChain, SPOKE_POOL};
    use alloy_primitives::{B256, U256};
    use deposit::DepositKey;

    fn scanner(chain: &MockChain, chunk_size: u64) -> ChainScanner<MockChain> {
        let gateway = Arc::new(Gateway::new("mock", chain.clone(), 2));
        ChainScanner::new(1, SPOKE_POOL, gateway, chunk_size, 1)
    }

    #[tokio::test]
    async fn test_scan_splits_range_into_chunks() {
        let chain = MockChain::new(250);
        let scanner = scanner(&chain, 100);

        let outcome = scanner.scan(10).await.unwrap();
        assert_eq!(outcome.head_block, 250);
        assert_eq!(chain.ranges(), vec![(10, 109), (110, 209), (210, 250)]);
    }

    #[tokio::test]
    async fn test_scan_orders_and_dedupes_facts() {
        let chain = MockChain::new(100);
        chain.push_log(fill_log(1, 7, 60, 0xbb, 0));
        chain.push_log(deposit_log(7, 130, 50, 0xaa, 2));
        // same log reported twice by the node
        chain.push_log(deposit_log(7, 130, 50, 0xaa, 2));
        chain.push_log(deposit_log(8, 130, 50, 0xac, 1));

        let outcome = scanner(&chain, 1_000).scan(0).await.unwrap();

        let ids: Vec<FactId> = outcome.facts.iter().map(ChainFact::id).collect();
        assert_eq!(
            ids,
            vec![
                FactId::new(B256::repeat_byte(0xac), 1),
                FactId::new(B256::repeat_byte(0xaa), 2),
                FactId::new(B256::repeat_byte(0xbb), 0),
            ]
        );
        assert_eq!(outcome.facts[2].key(), DepositKey::new(1, U256::from(7)));
    }

    #[tokio::test]
    async fn test_head_behind_floor_scans_nothing() {
        let chain = MockChain::new(40);
        let outcome = scanner(&chain, 100).scan(50).await.unwrap();

        assert!(outcome.facts.is_empty());
        assert_eq!(chain.get_logs_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_chunk_fails_scan_after_retries() {
        let chain = MockChain::new(100);
        chain.fail_get_logs(true);

        let result = scanner(&chain, 1_000).scan(0).await;
        assert!(matches!(result, Err(GatewayError::Rpc { .. })));
        // one attempt plus one retry
        assert_eq!(chain.get_logs_calls(), 2);
    }
}
