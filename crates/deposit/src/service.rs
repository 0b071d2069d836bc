//! Resolver service.
//!
//! A single task owns the [`DepositBook`]. Sync engines and indexer pollers send it
//! [`Fact`]s; after each applied fact it re-resolves the affected deposits and
//! broadcasts a [`StatusUpdate`] for every resolution that changed. Time-driven flags
//! are refreshed on a fixed re-evaluation tick.

use crate::{
    book::{Applied, DepositBook},
    fact::Fact,
    resolver::{resolve, Resolution, ResolverConfig},
    types::{Deposit, DepositKey, IndexerObservation},
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const FACT_CHANNEL_SIZE: usize = 1024;
const UPDATE_CHANNEL_SIZE: usize = 1024;

/// Source of the current unix time in seconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall clock.
pub fn system_clock() -> Clock {
    Arc::new(|| {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    })
}

/// A changed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub key: DepositKey,
    pub resolution: Resolution,
    /// `None` the first time a deposit is resolved
    pub previous: Option<Resolution>,
}

impl StatusUpdate {
    /// Whether this update moved the deposit into a terminal status.
    pub fn became_terminal(&self) -> bool {
        self.resolution.status.is_terminal()
            && self.previous.is_none_or(|p| !p.status.is_terminal())
    }
}

/// A deposit together with its current resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositView {
    pub deposit: Deposit,
    pub observation: Option<IndexerObservation>,
    pub resolution: Resolution,
}

enum Query {
    Snapshot(DepositKey, oneshot::Sender<Option<DepositView>>),
    All(oneshot::Sender<Vec<DepositView>>),
}

/// Cloneable access to a running resolver service.
#[derive(Clone)]
pub struct ResolverHandle {
    facts: mpsc::Sender<Fact>,
    queries: mpsc::Sender<Query>,
    updates: broadcast::Sender<StatusUpdate>,
}

impl ResolverHandle {
    /// Sender that producers push facts into.
    pub fn fact_sender(&self) -> mpsc::Sender<Fact> {
        self.facts.clone()
    }

    /// Submit one fact. Returns `false` if the service has stopped.
    pub async fn submit(&self, fact: impl Into<Fact>) -> bool {
        self.facts.send(fact.into()).await.is_ok()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    /// Current view of one deposit.
    ///
    /// Pending facts are drained before queries, so facts submitted before the call
    /// are reflected.
    pub async fn snapshot(&self, key: DepositKey) -> Option<DepositView> {
        let (tx, rx) = oneshot::channel();
        self.queries.send(Query::Snapshot(key, tx)).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Current view of every deposit.
    pub async fn deposits(&self) -> Vec<DepositView> {
        let (tx, rx) = oneshot::channel();
        if self.queries.send(Query::All(tx)).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

pub struct ResolverService {
    book: DepositBook,
    config: ResolverConfig,
    clock: Clock,
    resolutions: HashMap<DepositKey, Resolution>,
    updates: broadcast::Sender<StatusUpdate>,
}

impl ResolverService {
    /// Spawn the service. It runs until `cancel` fires or every fact sender, handles
    /// included, is dropped.
    pub fn spawn(
        config: ResolverConfig,
        reevaluate_interval: Duration,
        clock: Clock,
        cancel: CancellationToken,
    ) -> (ResolverHandle, JoinHandle<()>) {
        let (fact_tx, fact_rx) = mpsc::channel(FACT_CHANNEL_SIZE);
        let (query_tx, query_rx) = mpsc::channel(16);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_SIZE);

        let service = Self {
            book: DepositBook::with_retention(config.retention),
            config,
            clock,
            resolutions: HashMap::new(),
            updates: updates.clone(),
        };
        let task = tokio::spawn(service.run(fact_rx, query_rx, reevaluate_interval, cancel));

        let handle = ResolverHandle {
            facts: fact_tx,
            queries: query_tx,
            updates,
        };
        (handle, task)
    }

    async fn run(
        mut self,
        mut facts: mpsc::Receiver<Fact>,
        mut queries: mpsc::Receiver<Query>,
        reevaluate_interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut reevaluate = time::interval(reevaluate_interval);
        reevaluate.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Resolver service started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fact = facts.recv() => match fact {
                    Some(fact) => self.handle_fact(fact),
                    None => break,
                },
                Some(query) = queries.recv() => self.handle_query(query),
                _ = reevaluate.tick() => self.reevaluate(),
            }
        }

        info!(deposits = self.book.len(), "Resolver service stopped");
    }

    fn handle_fact(&mut self, fact: Fact) {
        let affected = match &fact {
            Fact::Chain(chain) => vec![chain.key()],
            Fact::Indexer { key, .. } | Fact::SuggestedFee { key, .. } => vec![*key],
            Fact::Limits { route, .. } => self.book.keys_on_route(route),
        };

        let now = (self.clock)();
        let applied = self.book.apply(fact, now);
        if applied == Applied::Duplicate || applied == Applied::Frozen {
            debug!(?applied, "Fact ignored");
        }
        if !applied.changed() {
            return;
        }

        for key in affected {
            self.publish(key, now);
        }
    }

    fn handle_query(&mut self, query: Query) {
        let now = (self.clock)();
        match query {
            Query::Snapshot(key, reply) => {
                let _ = reply.send(self.view(&key, now));
            }
            Query::All(reply) => {
                let keys: Vec<DepositKey> = self.book.keys().copied().collect();
                let views = keys.iter().filter_map(|k| self.view(k, now)).collect();
                let _ = reply.send(views);
            }
        }
    }

    fn reevaluate(&mut self) {
        let now = (self.clock)();
        self.book.evict(now);
        for key in self.book.pending_keys() {
            self.publish(key, now);
        }
    }

    fn view(&self, key: &DepositKey, now: u64) -> Option<DepositView> {
        let entry = self.book.get(key)?;
        let limits = self.book.limits_for(&entry.deposit.route());
        let resolution = resolve(
            &entry.deposit,
            entry.observation.as_ref(),
            limits,
            &self.config,
            now,
        );
        Some(DepositView {
            deposit: entry.deposit.clone(),
            observation: entry.observation.clone(),
            resolution,
        })
    }

    /// Resolve one deposit and broadcast if the resolution changed.
    fn publish(&mut self, key: DepositKey, now: u64) {
        let Some(view) = self.view(&key, now) else {
            return;
        };

        let previous = self.resolutions.insert(key, view.resolution);
        if previous == Some(view.resolution) {
            return;
        }

        debug!(
            key = %key,
            status = %view.resolution.status,
            profitable = view.resolution.is_profitable,
            delayed = view.resolution.is_delayed,
            expired = view.resolution.is_expired,
            "Deposit resolution changed"
        );

        // no subscribers is fine
        let _ = self.updates.send(StatusUpdate {
            key,
            resolution: view.resolution,
            previous,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{created, filled, mock_deposit, observation},
        types::DepositStatus,
    };
    use std::sync::atomic::{AtomicU64, Ordering};

    fn fixed_clock(now: Arc<AtomicU64>) -> Clock {
        Arc::new(move || now.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_publishes_creation_and_fill() {
        let now = Arc::new(AtomicU64::new(1_000));
        let (handle, _task) = ResolverService::spawn(
            ResolverConfig::default(),
            Duration::from_secs(3600),
            fixed_clock(now),
            CancellationToken::new(),
        );
        let mut updates = handle.subscribe();

        let deposit = mock_deposit(1);
        let key = deposit.key;
        assert!(handle.submit(created(deposit, 0)).await);

        let first = updates.recv().await.unwrap();
        assert_eq!(first.key, key);
        assert_eq!(first.resolution.status, DepositStatus::Pending);
        assert_eq!(first.previous, None);

        handle.submit(filled(key, 1)).await;
        let second = updates.recv().await.unwrap();
        assert_eq!(second.resolution.status, DepositStatus::Filled);
        assert!(second.became_terminal());

        // replaying both facts publishes nothing new
        handle.submit(filled(key, 1)).await;
        handle
            .submit(Fact::Indexer {
                key,
                observation: observation(DepositStatus::Pending),
                deposit: None,
            })
            .await;

        let view = handle.snapshot(key).await.unwrap();
        assert_eq!(view.resolution.status, DepositStatus::Filled);
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reevaluation_flips_expiry() {
        let now = Arc::new(AtomicU64::new(1_000));
        let (handle, _task) = ResolverService::spawn(
            ResolverConfig::default(),
            Duration::from_secs(5),
            fixed_clock(now.clone()),
            CancellationToken::new(),
        );
        let mut updates = handle.subscribe();

        let mut deposit = mock_deposit(2);
        deposit.fill_deadline = 1_010;
        handle.submit(created(deposit, 0)).await;
        assert!(!updates.recv().await.unwrap().resolution.is_expired);

        now.store(1_011, Ordering::SeqCst);
        time::advance(Duration::from_secs(6)).await;

        let update = updates.recv().await.unwrap();
        assert!(update.resolution.is_expired);
        assert_eq!(update.resolution.status, DepositStatus::Pending);
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let (handle, task) = ResolverService::spawn(
            ResolverConfig::default(),
            Duration::from_secs(60),
            system_clock(),
            cancel.clone(),
        );

        cancel.cancel();
        task.await.unwrap();
        assert!(!handle.submit(created(mock_deposit(3), 0)).await);
        assert!(handle.deposits().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_handles_dropped() {
        let (handle, task) = ResolverService::spawn(
            ResolverConfig::default(),
            Duration::from_secs(1),
            system_clock(),
            CancellationToken::new(),
        );
        handle.submit(created(mock_deposit(4), 0)).await;
        drop(handle);

        time::timeout(Duration::from_secs(60), task)
            .await
            .expect("service outlived its handles")
            .unwrap();
    }
}
