//! Indexer reconciliation client.
//!
//! Polls the Across indexer API for tracked deposits and feeds each snapshot to the
//! resolver as a fact. Also serves the route context the resolver needs: liquidity
//! limits (cached, best-effort) and live suggested relayer fees.
//!
//! Retry policy lives in one place, [`is_retryable`]: client errors and bad bodies
//! wait for the next refetch cycle, everything else is retried immediately with
//! exponential backoff.

pub mod client;
pub mod error;
pub mod limits;
pub mod poller;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use client::{DepositSource, IndexerClient, QuoteSource, RetryPolicy};
pub use error::{is_retryable, IndexerError};
pub use limits::LimitsCache;
pub use poller::{spawn_poller, BatchTracker, PollExit, PollHandle};
pub use types::{DepositQuery, DepositRecord, LimitsResponse, SuggestedFeesResponse};
