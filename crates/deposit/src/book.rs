//! Keyed store of deposits and the facts applied to them.
//!
//! The book is the only place deposit records are mutated. It enforces two rules:
//! a chain fact is applied at most once per `(transactionHash, logIndex)`, and a
//! record that reached a terminal status is never written again.
//!
//! Facts for deposits the book has not seen, and the ids of applied chain facts, are
//! remembered for a bounded [`Retention`] only. Most fills on a SpokePool belong to
//! deposits this tracker never scanned, so they are dropped once they age out.

use crate::{
    fact::{ChainFact, Fact, FactId, FillInfo},
    types::{Deposit, DepositKey, DepositStatus, FeePct, IndexerObservation, Limits, Route},
};
use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};
use tracing::{debug, trace};

/// How long the book remembers facts it could not place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Age after which parked facts and applied fact ids are forgotten
    pub ttl: Duration,
    /// Most deposits with parked facts at once; the oldest go first
    pub max_parked: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_parked: 10_000,
        }
    }
}

/// Outcome of applying one fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new deposit record was created
    Created,
    /// An existing record changed
    Updated,
    /// The fact matched the current state
    Unchanged,
    /// The chain fact was applied before
    Duplicate,
    /// The record is terminal; the fact was ignored
    Frozen,
    /// The deposit is unknown; the fact is held until it appears
    Parked,
    /// Route limits were replaced
    LimitsUpdated,
}

impl Applied {
    /// Whether the resolution of the affected deposits may have changed.
    pub const fn changed(self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::LimitsUpdated)
    }
}

/// A deposit plus the latest indexer snapshot for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub deposit: Deposit,
    pub observation: Option<IndexerObservation>,
}

/// Facts received before their deposit.
#[derive(Debug, Default)]
struct Early {
    seq: u64,
    fill: Option<FillInfo>,
    observation: Option<IndexerObservation>,
    suggested_fee: Option<FeePct>,
}

#[derive(Debug, Default)]
pub struct DepositBook {
    entries: HashMap<DepositKey, Entry>,
    /// applied chain fact ids, with the time they were applied
    seen: HashMap<FactId, u64>,
    seen_order: VecDeque<(u64, FactId)>,
    early: HashMap<DepositKey, Early>,
    /// `(parked at, seq, key)` in parking order
    early_order: VecDeque<(u64, u64, DepositKey)>,
    next_seq: u64,
    limits: HashMap<Route, Limits>,
    retention: Retention,
}

impl DepositBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: Retention) -> Self {
        Self {
            retention,
            ..Self::default()
        }
    }

    /// Apply one fact observed at unix time `now`.
    pub fn apply(&mut self, fact: Fact, now: u64) -> Applied {
        match fact {
            Fact::Chain(fact) => self.apply_chain(fact, now),
            Fact::Indexer {
                key,
                observation,
                deposit,
            } => self.apply_observation(key, observation, deposit.map(|d| *d), now),
            Fact::SuggestedFee { key, fee } => self.apply_suggested_fee(key, fee, now),
            Fact::Limits { route, limits } => {
                self.limits.insert(route, limits);
                Applied::LimitsUpdated
            }
        }
    }

    pub fn get(&self, key: &DepositKey) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn limits_for(&self, route: &Route) -> Option<&Limits> {
        self.limits.get(route)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deposits with facts waiting for their creation.
    pub fn parked(&self) -> usize {
        self.early.len()
    }

    /// Applied chain fact ids still remembered.
    pub fn remembered_facts(&self) -> usize {
        self.seen.len()
    }

    /// Forget parked facts and fact ids older than the retention ttl.
    /// Returns the number of parked deposits dropped.
    pub fn evict(&mut self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.retention.ttl.as_secs());

        while let Some(&(at, id)) = self.seen_order.front() {
            if at > cutoff {
                break;
            }
            self.seen_order.pop_front();
            if self.seen.get(&id) == Some(&at) {
                self.seen.remove(&id);
            }
        }

        let mut dropped = 0;
        while let Some(&(at, seq, key)) = self.early_order.front() {
            if at > cutoff {
                break;
            }
            self.early_order.pop_front();
            dropped += usize::from(self.drop_parked(key, seq));
        }
        if dropped > 0 {
            debug!(dropped, parked = self.early.len(), "Dropped facts for unknown deposits");
        }
        dropped
    }

    pub fn keys(&self) -> impl Iterator<Item = &DepositKey> {
        self.entries.keys()
    }

    /// Keys of deposits that are not terminal yet.
    pub fn pending_keys(&self) -> Vec<DepositKey> {
        self.entries
            .values()
            .filter(|e| !e.deposit.is_terminal())
            .map(|e| e.deposit.key)
            .collect()
    }

    /// Keys of deposits travelling on `route`.
    pub fn keys_on_route(&self, route: &Route) -> Vec<DepositKey> {
        self.entries
            .values()
            .filter(|e| e.deposit.route() == *route)
            .map(|e| e.deposit.key)
            .collect()
    }

    fn apply_chain(&mut self, fact: ChainFact, now: u64) -> Applied {
        let id = fact.id();
        if self.seen.contains_key(&id) {
            trace!(key = %fact.key(), "Duplicate chain fact");
            return Applied::Duplicate;
        }
        self.seen.insert(id, now);
        self.seen_order.push_back((now, id));

        match fact {
            ChainFact::DepositCreated { deposit, .. } => self.upsert_from_chain(*deposit),
            ChainFact::DepositFilled { key, fill, .. } => match self.entries.get_mut(&key) {
                Some(entry) if entry.deposit.is_terminal() => frozen(&key),
                Some(entry) => {
                    mark_filled(&mut entry.deposit, fill);
                    Applied::Updated
                }
                None => {
                    self.park(key, now).fill = Some(fill);
                    Applied::Parked
                }
            },
        }
    }

    fn upsert_from_chain(&mut self, deposit: Deposit) -> Applied {
        let key = deposit.key;
        let Some(entry) = self.entries.get_mut(&key) else {
            return self.create(deposit);
        };

        if entry.deposit.is_terminal() {
            return frozen(&key);
        }

        // The chain is authoritative for the deposit parameters; lifecycle fields and
        // the live fee quote are kept.
        let current = &entry.deposit;
        let merged = Deposit {
            status: current.status,
            fill_tx_hash: current.fill_tx_hash,
            fill_timestamp: current.fill_timestamp,
            suggested_relayer_fee_pct: current.suggested_relayer_fee_pct,
            deposit_tx_hash: deposit.deposit_tx_hash.or(current.deposit_tx_hash),
            ..deposit
        };

        if merged == entry.deposit {
            return Applied::Unchanged;
        }
        entry.deposit = merged;
        Applied::Updated
    }

    fn create(&mut self, deposit: Deposit) -> Applied {
        let key = deposit.key;
        let mut entry = Entry {
            deposit,
            observation: None,
        };

        if let Some(early) = self.early.remove(&key) {
            debug!(key = %key, "Applying facts received before the deposit");
            if let Some(fill) = early.fill {
                mark_filled(&mut entry.deposit, fill);
            }
            if let Some(observation) = early.observation {
                observe(&mut entry, observation);
            }
            if let Some(fee) = early.suggested_fee {
                if !entry.deposit.is_terminal() {
                    entry.deposit.suggested_relayer_fee_pct = Some(fee);
                }
            }
        }

        debug!(key = %key, status = %entry.deposit.status, "Tracking new deposit");
        self.entries.insert(key, entry);
        Applied::Created
    }

    fn apply_observation(
        &mut self,
        key: DepositKey,
        observation: IndexerObservation,
        seed: Option<Deposit>,
        now: u64,
    ) -> Applied {
        match self.entries.get_mut(&key) {
            Some(entry) if entry.deposit.is_terminal() => frozen(&key),
            Some(entry) => {
                if entry.observation.as_ref() == Some(&observation) {
                    return Applied::Unchanged;
                }
                observe(entry, observation);
                Applied::Updated
            }
            None => {
                self.park(key, now).observation = Some(observation);
                match seed {
                    Some(deposit) if deposit.key == key => self.create(deposit),
                    _ => Applied::Parked,
                }
            }
        }
    }

    fn apply_suggested_fee(&mut self, key: DepositKey, fee: FeePct, now: u64) -> Applied {
        match self.entries.get_mut(&key) {
            Some(entry) if entry.deposit.is_terminal() => frozen(&key),
            Some(entry) if entry.deposit.suggested_relayer_fee_pct == Some(fee) => {
                Applied::Unchanged
            }
            Some(entry) => {
                entry.deposit.suggested_relayer_fee_pct = Some(fee);
                Applied::Updated
            }
            None => {
                self.park(key, now).suggested_fee = Some(fee);
                Applied::Parked
            }
        }
    }

    /// The parked slot for `key`, making room if the book is at capacity.
    fn park(&mut self, key: DepositKey, now: u64) -> &mut Early {
        if !self.early.contains_key(&key) {
            while self.early.len() >= self.retention.max_parked.max(1) {
                let Some((_, seq, oldest)) = self.early_order.pop_front() else {
                    break;
                };
                self.drop_parked(oldest, seq);
            }
            self.next_seq += 1;
            self.early_order.push_back((now, self.next_seq, key));
        }

        let seq = self.next_seq;
        self.early.entry(key).or_insert_with(|| Early {
            seq,
            ..Default::default()
        })
    }

    /// Remove the parked facts of `key` if they are the ones parked as `seq`.
    fn drop_parked(&mut self, key: DepositKey, seq: u64) -> bool {
        if self.early.get(&key).is_some_and(|e| e.seq == seq) {
            trace!(key = %key, "Dropping parked facts");
            self.early.remove(&key);
            return true;
        }
        false
    }
}

fn frozen(key: &DepositKey) -> Applied {
    trace!(key = %key, "Ignoring fact for terminal deposit");
    Applied::Frozen
}

fn mark_filled(deposit: &mut Deposit, fill: FillInfo) {
    deposit.status = DepositStatus::Filled;
    deposit.fill_tx_hash = Some(fill.fill_tx_hash);
    deposit.fill_timestamp = fill.fill_timestamp.or(deposit.fill_timestamp);
}

/// Replace the snapshot wholesale and promote a terminal indexer status.
fn observe(entry: &mut Entry, observation: IndexerObservation) {
    if entry.deposit.is_terminal() {
        return;
    }

    let status = observation.status();
    if status.is_terminal() {
        entry.deposit.status = status;
        if status == DepositStatus::Filled {
            entry.deposit.fill_tx_hash = observation.fill_tx_hash.or(entry.deposit.fill_tx_hash);
            entry.deposit.fill_timestamp = observation
                .fill_block_timestamp
                .or(entry.deposit.fill_timestamp);
        }
    }
    entry.observation = Some(observation);
}
