//! Per-deposit indexer refetch loops.
//!
//! Every tracked deposit has its own task that fetches the indexer record on a fixed
//! interval and forwards it to the resolver as a [`Fact::Indexer`]. A loop ends when
//! the indexer reports a terminal status or when its [`PollHandle`] is stopped. A
//! failure on one deposit only costs that deposit one cycle.

use crate::{client::DepositSource, types::DepositQuery};
use deposit::{DepositKey, Fact};
use metrics::counter;
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a poll loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    Terminal,
    Stopped,
    ReceiverClosed,
}

/// Owner of one running poll loop.
#[derive(Debug)]
pub struct PollHandle {
    query: DepositQuery,
    key: Arc<OnceLock<DepositKey>>,
    cancel: CancellationToken,
    task: JoinHandle<PollExit>,
}

impl PollHandle {
    pub const fn query(&self) -> DepositQuery {
        self.query
    }

    /// Deposit key, once known. Tx-hash lookups learn it from the first record.
    pub fn key(&self) -> Option<DepositKey> {
        self.query.key().or_else(|| self.key.get().copied())
    }

    /// Stop the loop. A fetch already in flight is dropped and never reported.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Option<PollExit> {
        self.task.await.ok()
    }
}

/// Spawn a refetch loop for `query`. The first fetch happens immediately.
pub fn spawn_poller<S: DepositSource>(
    source: Arc<S>,
    query: DepositQuery,
    refetch_interval: Duration,
    facts: mpsc::Sender<Fact>,
    cancel: CancellationToken,
) -> PollHandle {
    let key = Arc::new(OnceLock::new());
    if let Some(k) = query.key() {
        let _ = key.set(k);
    }

    let task = tokio::spawn(poll_loop(
        source,
        query,
        refetch_interval,
        facts,
        key.clone(),
        cancel.clone(),
    ));

    PollHandle {
        query,
        key,
        cancel,
        task,
    }
}

async fn poll_loop<S: DepositSource>(
    source: Arc<S>,
    query: DepositQuery,
    refetch_interval: Duration,
    facts: mpsc::Sender<Fact>,
    learned_key: Arc<OnceLock<DepositKey>>,
    cancel: CancellationToken,
) -> PollExit {
    let mut interval = time::interval(refetch_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(?query, "Indexer polling started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PollExit::Stopped,
            _ = interval.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollExit::Stopped,
            result = source.fetch_deposit(&query) => result,
        };

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let outcome = if e.is_not_found() { "not_found" } else { "error" };
                counter!("indexer_fetches_total", "outcome" => outcome).increment(1);
                if e.is_retryable() {
                    warn!(?query, error = %e, "Indexer fetch failed, retrying next cycle");
                } else {
                    debug!(?query, error = %e, "No indexer update this cycle");
                }
                continue;
            }
        };
        counter!("indexer_fetches_total", "outcome" => "ok").increment(1);

        let Some(key) = record.key().or_else(|| query.key()) else {
            debug!(?query, "Indexer record has no deposit key yet");
            continue;
        };
        let _ = learned_key.set(key);

        let observation = record.observation();
        let terminal = observation.status().is_terminal();
        let fact = Fact::Indexer {
            key,
            observation,
            deposit: record.to_deposit().map(Box::new),
        };

        // results that race a stop are discarded, also while waiting on a full channel
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return PollExit::Stopped,
            sent = facts.send(fact) => sent,
        };
        if sent.is_err() {
            return PollExit::ReceiverClosed;
        }

        if terminal {
            info!(key = %key, status = %record.status(), "Deposit terminal on indexer, polling stopped");
            return PollExit::Terminal;
        }
    }
}

/// Independent poll loops for a batch of deposits.
pub struct BatchTracker<S> {
    source: Arc<S>,
    refetch_interval: Duration,
    facts: mpsc::Sender<Fact>,
    cancel: CancellationToken,
    polls: HashMap<DepositQuery, PollHandle>,
}

impl<S: DepositSource> BatchTracker<S> {
    /// Loops are children of `cancel`.
    pub fn new(
        source: Arc<S>,
        refetch_interval: Duration,
        facts: mpsc::Sender<Fact>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            refetch_interval,
            facts,
            cancel,
            polls: HashMap::new(),
        }
    }

    /// Start polling `query`. Returns `false` if it is already being polled.
    pub fn track(&mut self, query: DepositQuery) -> bool {
        self.prune();
        if self.polls.contains_key(&query) {
            return false;
        }
        if let Some(key) = query.key() {
            if self.polls.values().any(|p| p.key() == Some(key)) {
                return false;
            }
        }

        let handle = spawn_poller(
            self.source.clone(),
            query,
            self.refetch_interval,
            self.facts.clone(),
            self.cancel.child_token(),
        );
        self.polls.insert(query, handle);
        true
    }

    /// Stop every loop polling `key`, however it was queried.
    pub fn untrack(&mut self, key: &DepositKey) -> usize {
        let queries: Vec<DepositQuery> = self
            .polls
            .iter()
            .filter(|(_, handle)| handle.key().as_ref() == Some(key))
            .map(|(query, _)| *query)
            .collect();

        for query in &queries {
            if let Some(handle) = self.polls.remove(query) {
                handle.stop();
            }
        }
        queries.len()
    }

    pub fn is_tracking(&self, key: &DepositKey) -> bool {
        self.polls
            .values()
            .any(|h| !h.is_finished() && h.key().as_ref() == Some(key))
    }

    /// Loops still running.
    pub fn active(&self) -> usize {
        self.polls.values().filter(|h| !h.is_finished()).count()
    }

    pub fn stop_all(&mut self) {
        for (_, handle) in self.polls.drain() {
            handle.stop();
        }
    }

    fn prune(&mut self) {
        self.polls.retain(|_, handle| !handle.is_finished());
    }
}

impl<S> Drop for BatchTracker<S> {
    fn drop(&mut self) {
        for handle in self.polls.values() {
            handle.stop();
        }
    }
}
