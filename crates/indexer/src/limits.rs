//! Best-effort cache of route limits.

use crate::client::QuoteSource;
use deposit::{Limits, Route};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::RwLock, time::Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Cached {
    limits: Limits,
    fetched_at: Instant,
}

/// Limits per route, refreshed once older than `ttl`.
///
/// A failed refresh keeps serving the last known value; a route that was never
/// fetched successfully yields `None`.
pub struct LimitsCache<S> {
    source: Arc<S>,
    ttl: Duration,
    entries: RwLock<HashMap<Route, Cached>>,
}

impl<S: QuoteSource> LimitsCache<S> {
    pub fn new(source: Arc<S>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, route: &Route) -> Option<Limits> {
        let cached = self.entries.read().await.get(route).copied();

        if let Some(cached) = cached {
            if cached.fetched_at.elapsed() < self.ttl {
                return Some(cached.limits);
            }
        }

        match self.source.limits(route).await {
            Ok(limits) => {
                debug!(?route, "Refreshed route limits");
                self.entries.write().await.insert(
                    *route,
                    Cached {
                        limits,
                        fetched_at: Instant::now(),
                    },
                );
                Some(limits)
            }
            Err(e) => {
                warn!(?route, error = %e, stale = cached.is_some(), "Failed to refresh route limits");
                cached.map(|c| c.limits)
            }
        }
    }

    /// Cached value without touching the source.
    pub async fn peek(&self, route: &Route) -> Option<Limits> {
        self.entries.read().await.get(route).map(|c| c.limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test_utils::MockIndexer, IndexerError};
    use alloy_primitives::{Address, U256};

    const TTL: Duration = Duration::from_secs(300);

    fn route() -> Route {
        Route {
            token: Address::repeat_byte(0x04),
            origin_chain_id: 1,
            destination_chain_id: 130,
        }
    }

    fn limits(short_delay: u64) -> Limits {
        Limits {
            max_deposit_short_delay: U256::from(short_delay),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_fresh_value_without_refetch() {
        let indexer = Arc::new(MockIndexer::new());
        indexer.set_limits(route(), Ok(limits(500)));
        let cache = LimitsCache::new(indexer.clone(), TTL);

        assert_eq!(cache.get(&route()).await, Some(limits(500)));
        assert_eq!(cache.get(&route()).await, Some(limits(500)));
        assert_eq!(indexer.limits_calls(), 1);

        indexer.set_limits(route(), Ok(limits(700)));
        tokio::time::advance(TTL).await;
        assert_eq!(cache.get(&route()).await, Some(limits(700)));
        assert_eq!(indexer.limits_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_value_served_on_failure() {
        let indexer = Arc::new(MockIndexer::new());
        let cache = LimitsCache::new(indexer.clone(), TTL);

        indexer.set_limits(route(), Err(IndexerError::Transport("down".into())));
        assert_eq!(cache.get(&route()).await, None);

        indexer.set_limits(route(), Ok(limits(500)));
        assert_eq!(cache.get(&route()).await, Some(limits(500)));

        indexer.set_limits(route(), Err(IndexerError::Transport("down".into())));
        tokio::time::advance(TTL).await;
        assert_eq!(cache.get(&route()).await, Some(limits(500)));
        assert_eq!(cache.peek(&route()).await, Some(limits(500)));
    }
}
