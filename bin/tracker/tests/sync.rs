//! Integration tests for chain sync feeding the resolver.
//!
//! Run with:
//! ```bash
//! cargo test --package tracker --test sync
//! ```

#[path = "setup.rs"]
mod setup;

use alloy_primitives::U256;
use chain_sync::{
    test_utils::{deposit_log, fill_log, MockChain, SPOKE_POOL},
    ChainSync, MemoryStateStore, SyncStateStore,
};
use client::Gateway;
use config::{ChainConfig, SyncSettings};
use deposit::{DepositKey, DepositStatus};
use setup::{spawn_resolver, wait_for_update};
use std::sync::{atomic::AtomicU64, Arc};
use tokio_util::sync::CancellationToken;

fn chain_sync(
    chain: &MockChain,
    chain_config: ChainConfig,
    store: Arc<MemoryStateStore>,
    facts: tokio::sync::mpsc::Sender<deposit::Fact>,
) -> ChainSync<MockChain, MemoryStateStore> {
    let gateway = Arc::new(Gateway::new(chain_config.name.clone(), chain.clone(), 2));
    let settings = SyncSettings {
        chunk_retries: 0,
        ..Default::default()
    };
    ChainSync::new(&chain_config, &settings, gateway, store, facts)
}

fn ethereum(lower_bound: u64) -> ChainConfig {
    ChainConfig::ethereum_mainnet("http://localhost:8545")
        .with_spoke_pool(SPOKE_POOL)
        .with_lower_bound(lower_bound)
}

fn unichain(lower_bound: u64) -> ChainConfig {
    ChainConfig::unichain_mainnet("http://localhost:9545")
        .with_spoke_pool(SPOKE_POOL)
        .with_lower_bound(lower_bound)
}

#[tokio::test]
async fn test_sync_floor_monotonic_over_mixed_outcomes() {
    let chain = MockChain::new(100);
    let store = Arc::new(MemoryStateStore::new());
    let (tx, _rx) = tokio::sync::mpsc::channel(64);
    let mut sync = chain_sync(&chain, ethereum(50), store.clone(), tx);

    let heads = [100, 130, 90, 130, 200, 150, 260];
    let failures = [false, true, false, false, true, false, false];
    let mut floor = sync.state().last_synced_block;

    for (head, fail) in heads.into_iter().zip(failures) {
        chain.set_head(head);
        chain.fail_get_logs(fail);
        let _ = sync.tick().await;

        let next = sync.state().last_synced_block;
        assert!(next >= floor, "floor moved back from {floor} to {next}");
        floor = next;
    }

    assert_eq!(floor, 260);
    assert_eq!(store.load(1), Some(260));
}

#[tokio::test]
async fn test_replayed_range_applies_facts_once() {
    let now = Arc::new(AtomicU64::new(1_700_000_500));
    let cancel = CancellationToken::new();
    let (resolver, _task) = spawn_resolver(now, cancel.clone());
    let mut updates = resolver.subscribe();

    let origin = MockChain::new(100);
    origin.push_log(deposit_log(7, 130, 80, 0xaa, 0));
    let destination = MockChain::new(500);
    destination.push_log(fill_log(1, 7, 450, 0xbb, 3));

    let store = Arc::new(MemoryStateStore::new());
    let mut origin_sync = chain_sync(&origin, ethereum(0), store.clone(), resolver.fact_sender());
    let mut destination_sync =
        chain_sync(&destination, unichain(400), store.clone(), resolver.fact_sender());

    origin_sync.tick().await.unwrap();
    destination_sync.tick().await.unwrap();

    let key = DepositKey::new(1, U256::from(7));
    let filled = wait_for_update(&mut updates, |u| u.key == key && u.resolution.status.is_terminal()).await;
    assert_eq!(filled.resolution.status, DepositStatus::Filled);

    // a restart from an empty store replays both ranges
    let fresh = Arc::new(MemoryStateStore::new());
    let mut origin_replay = chain_sync(&origin, ethereum(0), fresh.clone(), resolver.fact_sender());
    let mut destination_replay =
        chain_sync(&destination, unichain(400), fresh, resolver.fact_sender());
    origin_replay.tick().await.unwrap();
    destination_replay.tick().await.unwrap();

    let view = resolver.snapshot(key).await.unwrap();
    assert_eq!(view.resolution.status, DepositStatus::Filled);
    assert_eq!(resolver.deposits().await.len(), 1);
    assert!(updates.try_recv().is_err());

    cancel.cancel();
}

#[tokio::test]
async fn test_chains_resume_from_store_independently() {
    let store = Arc::new(MemoryStateStore::new());
    store.save(1, 1_000);

    let (tx, _rx) = tokio::sync::mpsc::channel(8);
    let origin = chain_sync(&MockChain::new(0), ethereum(10), store.clone(), tx.clone());
    let destination = chain_sync(&MockChain::new(0), unichain(10), store, tx);

    assert_eq!(origin.state().last_synced_block, 1_000);
    assert_eq!(destination.state().last_synced_block, 10);
}
