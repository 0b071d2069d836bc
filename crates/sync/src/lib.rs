//! Multi-chain polling sync engine.
//!
//! Each configured chain gets its own [`ChainSync`] loop. On every tick it reads
//! SpokePool logs through the chain's [`client::Gateway`] from the last synced block
//! up to the current head, hands the decoded deposit facts to the resolver in
//! block/log order, and only then advances its floor. A failed scan leaves the floor
//! where it was so the next tick retries the same range.

pub mod engine;
pub mod events;
pub mod scanner;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use engine::{ChainPhase, ChainProgress, ChainSync, SyncEngine, SyncHandle, TickReport};
pub use scanner::{ChainScanner, ScanOutcome};
pub use state::{ChainSyncState, MemoryStateStore, SyncStateStore};

use client::GatewayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// RPC call through the gateway failed
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The resolver stopped accepting facts
    #[error("fact receiver closed")]
    Closed,
}
