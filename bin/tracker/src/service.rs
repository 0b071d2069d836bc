//! Wiring of the tracker: chain sync, indexer polling and the resolver.
//!
//! Producers (chain loops, indexer pollers, route context lookups) send facts into
//! one channel that is forwarded to the resolver service. The [`Coordinator`] reacts
//! to the resolver's published updates: it starts indexer polling for new deposits,
//! fetches their route limits and fee quote, and stops polling once a deposit is
//! terminal no matter which source said so. Fee quotes and limits of pending deposits
//! are refreshed on a fixed interval. If the coordinator falls behind the update
//! stream it rebuilds its tracking from the resolver's full view.

use crate::{config::Config, metrics::Metrics};
use alloy_primitives::U256;
use chain_sync::{ChainSync, MemoryStateStore, SyncEngine};
use deposit::{
    system_clock, Deposit, DepositKey, Fact, ResolverHandle, ResolverService, Route,
    StatusUpdate,
};
use indexer::{
    BatchTracker, DepositQuery, DepositSource, IndexerClient, LimitsCache, QuoteSource,
};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, broadcast::error::RecvError, mpsc},
    task::{JoinHandle, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const FACT_BUFFER: usize = 1024;
const DEFAULT_QUOTE_REFRESH: Duration = Duration::from_secs(60);

/// Forward producer facts to the resolver, counting them on the way.
pub fn spawn_fact_forwarder(
    mut facts: mpsc::Receiver<Fact>,
    resolver: &ResolverHandle,
    metrics: Metrics,
) -> JoinHandle<()> {
    let sender = resolver.fact_sender();
    tokio::spawn(async move {
        while let Some(fact) = facts.recv().await {
            metrics.record_fact(&fact);
            if sender.send(fact).await.is_err() {
                debug!("Resolver stopped, dropping facts");
                break;
            }
        }
    })
}

/// Reacts to resolution changes.
pub struct Coordinator<D, Q> {
    resolver: ResolverHandle,
    updates: broadcast::Receiver<StatusUpdate>,
    polls: BatchTracker<D>,
    quotes: Arc<Q>,
    limits: Arc<LimitsCache<Q>>,
    facts: mpsc::Sender<Fact>,
    auto_track: bool,
    metrics: Metrics,
    lookups: JoinSet<()>,
    /// deposits whose route context was requested
    quoted: HashSet<DepositKey>,
    quote_refresh: Duration,
    refresh: Option<JoinHandle<()>>,
}

impl<D, Q> Coordinator<D, Q>
where
    D: DepositSource,
    Q: QuoteSource,
{
    /// Subscribes to the resolver immediately, so no update published after this
    /// call is missed.
    pub fn new(
        resolver: ResolverHandle,
        polls: BatchTracker<D>,
        quotes: Arc<Q>,
        limits: Arc<LimitsCache<Q>>,
        facts: mpsc::Sender<Fact>,
        auto_track: bool,
        metrics: Metrics,
    ) -> Self {
        Self {
            updates: resolver.subscribe(),
            resolver,
            polls,
            quotes,
            limits,
            facts,
            auto_track,
            metrics,
            lookups: JoinSet::new(),
            quoted: HashSet::new(),
            quote_refresh: DEFAULT_QUOTE_REFRESH,
            refresh: None,
        }
    }

    /// Interval at which fee quotes and limits of pending deposits are refreshed.
    pub const fn with_quote_refresh(mut self, interval: Duration) -> Self {
        self.quote_refresh = interval;
        self
    }

    /// Start indexer polling for `query`.
    pub fn track(&mut self, query: DepositQuery) -> bool {
        let started = self.polls.track(query);
        if started {
            debug!(?query, "Tracking deposit on indexer");
        }
        self.metrics.set_indexer_polls(self.polls.active());
        started
    }

    pub fn is_tracking(&self, key: &DepositKey) -> bool {
        self.polls.is_tracking(key)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.quote_refresh.max(Duration::from_secs(1));
        let mut refresh = time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let update = tokio::select! {
                _ = cancel.cancelled() => break,
                update = self.updates.recv() => update,
                _ = refresh.tick() => {
                    self.refresh_quotes();
                    continue;
                }
            };

            match update {
                Ok(update) => self.handle_update(update).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Coordinator lagged behind resolver updates, resyncing");
                    self.resync().await;
                }
                Err(RecvError::Closed) => break,
            }
        }

        self.polls.stop_all();
        self.lookups.shutdown().await;
        if let Some(refresh) = self.refresh.take() {
            refresh.abort();
        }
        info!("Coordinator stopped");
    }

    async fn handle_update(&mut self, update: StatusUpdate) {
        self.metrics.record_update(&update);

        let key = update.key;
        let resolution = update.resolution;

        if resolution.status.is_terminal() {
            let stopped = self.settle(&key);
            if update.became_terminal() {
                info!(
                    key = %key,
                    status = %resolution.status,
                    fill_time_secs = ?resolution.fill_time_secs,
                    stopped_polls = stopped,
                    "Deposit reached terminal status"
                );
            }
            return;
        }

        debug!(
            key = %key,
            profitable = resolution.is_profitable,
            delayed = resolution.is_delayed,
            expired = resolution.is_expired,
            "Deposit pending"
        );

        if update.previous.is_none() {
            if self.auto_track {
                self.track(DepositQuery::Key(key));
            }
            if !self.quoted.contains(&key) {
                if let Some(view) = self.resolver.snapshot(key).await {
                    self.fetch_route_context(&view.deposit);
                }
            }
        }
    }

    /// Stop polling a terminal deposit and forget its quote state.
    fn settle(&mut self, key: &DepositKey) -> usize {
        self.quoted.remove(key);
        let stopped = self.polls.untrack(key);
        self.metrics.set_indexer_polls(self.polls.active());
        stopped
    }

    /// Rebuild tracking from the resolver's current view after updates were lost.
    async fn resync(&mut self) {
        let views = self.resolver.deposits().await;
        let (mut tracked, mut quoted, mut settled) = (0, 0, 0);

        for view in &views {
            let key = view.deposit.key;
            if view.resolution.status.is_terminal() {
                settled += self.settle(&key);
                continue;
            }
            if self.auto_track
                && !self.polls.is_tracking(&key)
                && self.track(DepositQuery::Key(key))
            {
                tracked += 1;
            }
            if !self.quoted.contains(&key) {
                self.fetch_route_context(&view.deposit);
                quoted += 1;
            }
        }

        info!(
            deposits = views.len(),
            tracked,
            quoted,
            stopped_polls = settled,
            "Resynced with resolver"
        );
    }

    /// Look up limits and the live fee quote for a new deposit in the background.
    fn fetch_route_context(&mut self, deposit: &Deposit) {
        self.quoted.insert(deposit.key);

        let quotes = self.quotes.clone();
        let limits = self.limits.clone();
        let facts = self.facts.clone();
        let (key, route, amount) = (deposit.key, deposit.route(), deposit.input_amount);

        self.lookups.spawn(async move {
            if let Some(limits) = limits.get(&route).await {
                let _ = facts.send(Fact::Limits { route, limits }).await;
            }
            quote_fee(&*quotes, &facts, key, route, amount).await;
        });

        while self.lookups.try_join_next().is_some() {}
    }

    /// Refresh limits and fee quotes of every pending deposit, one pass at a time.
    fn refresh_quotes(&mut self) {
        if self.refresh.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("Previous quote refresh still running");
            return;
        }

        let resolver = self.resolver.clone();
        let quotes = self.quotes.clone();
        let limits = self.limits.clone();
        let facts = self.facts.clone();

        self.refresh = Some(tokio::spawn(async move {
            let pending: Vec<Deposit> = resolver
                .deposits()
                .await
                .into_iter()
                .filter(|view| !view.resolution.status.is_terminal())
                .map(|view| view.deposit)
                .collect();

            let routes: HashSet<Route> = pending.iter().map(Deposit::route).collect();
            for route in routes {
                if let Some(limits) = limits.get(&route).await {
                    if facts.send(Fact::Limits { route, limits }).await.is_err() {
                        return;
                    }
                }
            }

            for deposit in &pending {
                let route = deposit.route();
                quote_fee(&*quotes, &facts, deposit.key, route, deposit.input_amount).await;
            }
            debug!(deposits = pending.len(), "Refreshed fee quotes");
        }));
    }
}

async fn quote_fee<Q: QuoteSource>(
    quotes: &Q,
    facts: &mpsc::Sender<Fact>,
    key: DepositKey,
    route: Route,
    amount: U256,
) {
    match quotes.suggested_fee(&route, amount).await {
        Ok(fee) => {
            let _ = facts.send(Fact::SuggestedFee { key, fee }).await;
        }
        Err(e) => debug!(key = %key, error = %e, "No suggested fee this cycle"),
    }
}

/// Run the tracker until `cancel` fires.
pub async fn run(config: Config, metrics: Metrics, cancel: CancellationToken) -> eyre::Result<()> {
    let (resolver, resolver_task) = ResolverService::spawn(
        config.resolver_config()?,
        config.resolver.reevaluate_interval(),
        system_clock(),
        cancel.child_token(),
    );

    let (facts, fact_rx) = mpsc::channel(FACT_BUFFER);
    let forwarder = spawn_fact_forwarder(fact_rx, &resolver, metrics.clone());

    let store = Arc::new(MemoryStateStore::new());
    let mut gateways = Vec::with_capacity(config.chains.len());
    let mut chains = Vec::with_capacity(config.chains.len());

    for chain in &config.chains {
        let gateway = Arc::new(client::create_gateway(
            chain.name.clone(),
            &chain.rpc_url,
            chain.max_concurrency,
        )?);
        info!(
            chain_id = chain.chain_id,
            name = %chain.name,
            spoke_pool = %chain.spoke_pool,
            max_concurrency = chain.max_concurrency,
            "Configured chain"
        );

        chains.push(ChainSync::new(
            chain,
            &config.sync,
            gateway.clone(),
            store.clone(),
            facts.clone(),
        ));
        gateways.push(gateway);
    }

    let sync = SyncEngine::spawn(chains, cancel.child_token());

    let indexer = Arc::new(IndexerClient::from_settings(&config.indexer)?);
    let limits = Arc::new(LimitsCache::new(indexer.clone(), config.indexer.limits_ttl()));
    let polls = BatchTracker::new(
        indexer.clone(),
        config.indexer.refetch_interval(),
        facts.clone(),
        cancel.child_token(),
    );

    let mut coordinator = Coordinator::new(
        resolver,
        polls,
        indexer,
        limits,
        facts,
        config.indexer.auto_track,
        metrics,
    )
    .with_quote_refresh(config.indexer.quote_refresh());
    for tx_hash in config.track_tx_hashes()? {
        coordinator.track(DepositQuery::TxHash(tx_hash));
    }

    info!(chains = config.chains.len(), "Tracker running");
    coordinator.run(cancel.clone()).await;

    sync.stop();
    sync.join().await;
    for gateway in &gateways {
        gateway.shutdown();
    }

    resolver_task.await?;
    forwarder.abort();

    Ok(())
}
