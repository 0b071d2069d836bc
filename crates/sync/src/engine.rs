//! Per-chain polling loops.
//!
//! A [`ChainSync`] owns its chain's [`ChainSyncState`] and is driven by one task, so
//! two scans of the same chain can never overlap: a tick that fires while a scan is
//! still running is skipped. Different chains run in independent tasks.

use crate::{
    scanner::ChainScanner,
    state::{ChainSyncState, SyncStateStore},
    SyncError,
};
use client::{Gateway, RpcTransport};
use config::{ChainConfig, SyncSettings};
use deposit::Fact;
use metrics::{counter, gauge};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPhase {
    Idle,
    Scanning,
}

/// Observable progress of one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainProgress {
    pub chain_id: u64,
    pub phase: ChainPhase,
    pub last_synced_block: u64,
}

/// What one successful tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub from_block: u64,
    pub head_block: u64,
    pub facts: usize,
    pub advanced: bool,
}

pub struct ChainSync<T, S> {
    scanner: ChainScanner<T>,
    state: ChainSyncState,
    store: Arc<S>,
    facts: mpsc::Sender<Fact>,
    progress: watch::Sender<ChainProgress>,
}

impl<T, S> ChainSync<T, S>
where
    T: RpcTransport,
    S: SyncStateStore,
{
    /// Build the loop for `chain`, resuming from the store when it has a cursor.
    pub fn new(
        chain: &ChainConfig,
        settings: &SyncSettings,
        gateway: Arc<Gateway<T>>,
        store: Arc<S>,
        facts: mpsc::Sender<Fact>,
    ) -> Self {
        let state = ChainSyncState::resume(
            chain.chain_id,
            chain.lower_bound_block,
            store.load(chain.chain_id),
            settings.poll_interval(),
            gateway.endpoint(),
        );
        let scanner = ChainScanner::new(
            chain.chain_id,
            chain.spoke_pool,
            gateway,
            settings.chunk_size,
            settings.chunk_retries,
        );
        let (progress, _) = watch::channel(ChainProgress {
            chain_id: chain.chain_id,
            phase: ChainPhase::Idle,
            last_synced_block: state.last_synced_block,
        });

        Self {
            scanner,
            state,
            store,
            facts,
            progress,
        }
    }

    pub const fn state(&self) -> &ChainSyncState {
        &self.state
    }

    pub fn progress(&self) -> watch::Receiver<ChainProgress> {
        self.progress.subscribe()
    }

    /// Run one scan. Facts are handed off before the floor moves; on any error the
    /// floor stays put and the same range is scanned next time.
    pub async fn tick(&mut self) -> Result<TickReport, SyncError> {
        let chain = self.state.chain_id.to_string();
        self.set_phase(ChainPhase::Scanning);

        let result = self.scan_and_publish().await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("sync_scans_total", "chain" => chain.clone(), "outcome" => outcome).increment(1);
        gauge!("sync_last_synced_block", "chain" => chain).set(self.state.last_synced_block as f64);

        self.set_phase(ChainPhase::Idle);
        result
    }

    async fn scan_and_publish(&mut self) -> Result<TickReport, SyncError> {
        let outcome = self.scanner.scan(self.state.last_synced_block).await?;
        let facts = outcome.facts.len();

        for fact in outcome.facts {
            self.facts
                .send(fact.into())
                .await
                .map_err(|_| SyncError::Closed)?;
        }

        let advanced = self.state.advance(outcome.head_block);
        if advanced {
            self.store
                .save(self.state.chain_id, self.state.last_synced_block);
        }

        Ok(TickReport {
            from_block: outcome.from_block,
            head_block: outcome.head_block,
            facts,
            advanced,
        })
    }

    fn set_phase(&self, phase: ChainPhase) {
        self.progress.send_replace(ChainProgress {
            chain_id: self.state.chain_id,
            phase,
            last_synced_block: self.state.last_synced_block,
        });
    }

    /// Poll until `cancel` fires or the fact receiver goes away.
    pub async fn run(mut self, cancel: CancellationToken) {
        let chain_id = self.state.chain_id;
        let mut interval = time::interval(self.state.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            chain_id,
            endpoint = %self.state.endpoint,
            from_block = self.state.last_synced_block,
            "Chain sync started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.tick() => result,
            };

            match result {
                Ok(report) => debug!(
                    chain_id,
                    from = report.from_block,
                    head = report.head_block,
                    facts = report.facts,
                    "Chain scan complete"
                ),
                Err(SyncError::Closed) => {
                    warn!(chain_id, "Fact receiver closed, stopping chain sync");
                    break;
                }
                Err(e) => warn!(
                    chain_id,
                    floor = self.state.last_synced_block,
                    error = %e,
                    "Chain scan failed, retrying next tick"
                ),
            }
        }

        self.set_phase(ChainPhase::Idle);
        info!(chain_id, last_synced_block = self.state.last_synced_block, "Chain sync stopped");
    }
}

/// Handle over every running chain loop.
pub struct SyncHandle {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    progress: Vec<watch::Receiver<ChainProgress>>,
}

impl SyncHandle {
    /// Signal every chain loop to stop after its current step.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn progress(&self) -> &[watch::Receiver<ChainProgress>] {
        &self.progress
    }

    /// Wait for every chain loop to finish.
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Chain sync task ended abnormally");
            }
        }
    }
}

pub struct SyncEngine;

impl SyncEngine {
    /// Spawn one task per chain. All of them stop when `cancel` fires.
    pub fn spawn<T, S>(chains: Vec<ChainSync<T, S>>, cancel: CancellationToken) -> SyncHandle
    where
        T: RpcTransport,
        S: SyncStateStore,
    {
        let mut tasks = JoinSet::new();
        let mut progress = Vec::with_capacity(chains.len());

        for chain in chains {
            progress.push(chain.progress());
            tasks.spawn(chain.run(cancel.child_token()));
        }

        SyncHandle {
            cancel,
            tasks,
            progress,
        }
    }
}
