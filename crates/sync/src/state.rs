//! Per-chain sync cursor and its storage.

use std::{collections::HashMap, sync::Mutex, time::Duration};

/// Sync cursor of one chain. Owned by that chain's [`crate::ChainSync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSyncState {
    pub chain_id: u64,
    /// Floor of the next scan. Never decreases.
    pub last_synced_block: u64,
    pub poll_interval: Duration,
    /// Name of the gateway the chain is read through
    pub endpoint: String,
}

impl ChainSyncState {
    /// Start from the stored cursor, never below `lower_bound_block`.
    pub fn resume(
        chain_id: u64,
        lower_bound_block: u64,
        stored: Option<u64>,
        poll_interval: Duration,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            chain_id,
            last_synced_block: stored.unwrap_or_default().max(lower_bound_block),
            poll_interval,
            endpoint: endpoint.into(),
        }
    }

    /// Move the floor to `head` if that is forward. Returns whether it moved.
    pub fn advance(&mut self, head: u64) -> bool {
        if head <= self.last_synced_block {
            return false;
        }
        self.last_synced_block = head;
        true
    }
}

/// Durable home for sync cursors.
pub trait SyncStateStore: Send + Sync + 'static {
    fn load(&self, chain_id: u64) -> Option<u64>;

    fn save(&self, chain_id: u64, last_synced_block: u64);
}

/// Process-local store. Cursors are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    blocks: Mutex<HashMap<u64, u64>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SyncStateStore for MemoryStateStore {
    fn load(&self, chain_id: u64) -> Option<u64> {
        let blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        blocks.get(&chain_id).copied()
    }

    fn save(&self, chain_id: u64, last_synced_block: u64) {
        let mut blocks = self.blocks.lock().unwrap_or_else(|e| e.into_inner());
        let entry = blocks.entry(chain_id).or_default();
        *entry = (*entry).max(last_synced_block);
    }
}
