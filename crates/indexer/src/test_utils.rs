//! Scripted indexer for tests.

use crate::{
    client::{DepositSource, QuoteSource},
    types::{DepositQuery, DepositRecord},
    IndexerError,
};
use alloy_primitives::{B256, U256};
use deposit::{DepositKey, FeePct, Limits, Route};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

/// A reduced `/deposit/status` style record.
pub fn record(key: DepositKey, status: &str) -> DepositRecord {
    DepositRecord {
        status: status.to_string(),
        origin_chain_id: Some(key.origin_chain_id),
        deposit_id: Some(key.deposit_id),
        fill_tx: (status == "filled").then(|| B256::repeat_byte(0xf1)),
        ..Default::default()
    }
}

fn not_found() -> IndexerError {
    IndexerError::Status {
        status: 404,
        body: "deposit not found".to_string(),
    }
}

/// Answers from preset responses. Unknown deposits are 404, unknown routes fail.
#[derive(Default)]
pub struct MockIndexer {
    deposits: Mutex<HashMap<DepositQuery, Result<DepositRecord, IndexerError>>>,
    calls: Mutex<HashMap<DepositQuery, usize>>,
    limits: Mutex<HashMap<Route, Result<Limits, IndexerError>>>,
    fees: Mutex<HashMap<Route, FeePct>>,
    limits_calls: AtomicUsize,
    fee_calls: AtomicUsize,
    latency: Option<Duration>,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every deposit fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn respond(&self, key: DepositKey, response: Result<DepositRecord, IndexerError>) {
        self.respond_to(DepositQuery::Key(key), response);
    }

    pub fn respond_to(&self, query: DepositQuery, response: Result<DepositRecord, IndexerError>) {
        self.deposits.lock().unwrap().insert(query, response);
    }

    pub fn set_limits(&self, route: Route, limits: Result<Limits, IndexerError>) {
        self.limits.lock().unwrap().insert(route, limits);
    }

    pub fn set_fee(&self, route: Route, fee: FeePct) {
        self.fees.lock().unwrap().insert(route, fee);
    }

    /// Fetches of `key` by key lookup.
    pub fn calls(&self, key: DepositKey) -> usize {
        self.calls_for(DepositQuery::Key(key))
    }

    pub fn calls_for(&self, query: DepositQuery) -> usize {
        self.calls.lock().unwrap().get(&query).copied().unwrap_or_default()
    }

    pub fn limits_calls(&self) -> usize {
        self.limits_calls.load(Ordering::SeqCst)
    }

    pub fn fee_calls(&self) -> usize {
        self.fee_calls.load(Ordering::SeqCst)
    }
}

impl DepositSource for MockIndexer {
    async fn fetch_deposit(&self, query: &DepositQuery) -> Result<DepositRecord, IndexerError> {
        *self.calls.lock().unwrap().entry(*query).or_default() += 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = self.deposits.lock().unwrap().get(query).cloned();
        response.unwrap_or_else(|| Err(not_found()))
    }
}

impl QuoteSource for MockIndexer {
    async fn limits(&self, route: &Route) -> Result<Limits, IndexerError> {
        self.limits_calls.fetch_add(1, Ordering::SeqCst);
        let response = self.limits.lock().unwrap().get(route).cloned();
        response.unwrap_or_else(|| Err(IndexerError::Transport("no limits scripted".into())))
    }

    async fn suggested_fee(&self, route: &Route, _amount: U256) -> Result<FeePct, IndexerError> {
        self.fee_calls.fetch_add(1, Ordering::SeqCst);
        let fee = self.fees.lock().unwrap().get(route).copied();
        fee.ok_or_else(|| IndexerError::Transport("no fee scripted".into()))
    }
}
