//! HTTP client for the Across indexer API.

use crate::{
    error::{is_retryable, IndexerError},
    types::{DepositQuery, DepositRecord, DepositResponse, LimitsResponse, SuggestedFeesResponse},
};
use alloy_primitives::U256;
use config::IndexerSettings;
use deposit::{FeePct, Limits, Route};
use serde::de::DeserializeOwned;
use std::{future::Future, time::Duration};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Where deposit records come from.
pub trait DepositSource: Send + Sync + 'static {
    fn fetch_deposit(
        &self,
        query: &DepositQuery,
    ) -> impl Future<Output = Result<DepositRecord, IndexerError>> + Send;
}

/// Where route limits and live fee quotes come from.
pub trait QuoteSource: Send + Sync + 'static {
    fn limits(&self, route: &Route) -> impl Future<Output = Result<Limits, IndexerError>> + Send;

    fn suggested_fee(
        &self,
        route: &Route,
        amount: U256,
    ) -> impl Future<Output = Result<FeePct, IndexerError>> + Send;
}

/// Immediate retries of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// `base, 2·base, 4·base, ...` with jitter, capped at ten seconds.
    fn strategy(&self) -> impl Iterator<Item = Duration> {
        let half_base = (self.base_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(half_base)
            .max_delay(MAX_RETRY_DELAY)
            .map(jitter)
            .take(self.max_retries)
    }
}

#[derive(Debug, Clone)]
pub struct IndexerClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl IndexerClient {
    pub fn new(base_url: &str, retry: RetryPolicy) -> Result<Self, IndexerError> {
        Self::with_client(reqwest::Client::new(), base_url, retry)
    }

    /// Creates a client around an existing HTTP client.
    pub fn with_client(
        http: reqwest::Client,
        base_url: &str,
        retry: RetryPolicy,
    ) -> Result<Self, IndexerError> {
        reqwest::Url::parse(base_url)
            .map_err(|e| IndexerError::InvalidUrl(format!("{base_url}: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn from_settings(settings: &IndexerSettings) -> Result<Self, IndexerError> {
        Self::new(
            &settings.base_url,
            RetryPolicy {
                max_retries: settings.max_retries,
                base_delay: Duration::from_millis(settings.retry_base_delay_ms),
            },
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn deposit_by_tx_hash(
        &self,
        tx_hash: alloy_primitives::B256,
    ) -> Result<DepositRecord, IndexerError> {
        let response: DepositResponse = self
            .get("/deposit", &[("depositTxHash", tx_hash.to_string())])
            .await?;
        Ok(response.into_record())
    }

    pub async fn deposit_status(
        &self,
        key: deposit::DepositKey,
    ) -> Result<DepositRecord, IndexerError> {
        let mut record: DepositRecord = self
            .get(
                "/deposit/status",
                &[
                    ("originChainId", key.origin_chain_id.to_string()),
                    ("depositId", key.deposit_id.to_string()),
                ],
            )
            .await?;

        // the status endpoint may omit the key it was asked for
        record.origin_chain_id.get_or_insert(key.origin_chain_id);
        record.deposit_id.get_or_insert(key.deposit_id);
        Ok(record)
    }

    pub async fn route_limits(&self, route: &Route) -> Result<Limits, IndexerError> {
        let wire: LimitsResponse = self.get("/limits", &route_params(route)).await?;
        wire.try_into()
    }

    pub async fn suggested_relayer_fee(
        &self,
        route: &Route,
        amount: U256,
    ) -> Result<FeePct, IndexerError> {
        let mut params = route_params(route);
        params.push(("amount", amount.to_string()));

        let wire: SuggestedFeesResponse = self.get("/suggested-fees", &params).await?;
        wire.try_into()
    }

    /// GET `path` with retries on retryable failures only.
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, IndexerError> {
        let url = format!("{}{}", self.base_url, path);

        RetryIf::spawn(
            self.retry.strategy(),
            || self.get_once(&url, params),
            |e: &IndexerError| {
                let retry = is_retryable(e);
                if retry {
                    warn!(url = %url, error = %e, "Indexer request failed, will retry");
                }
                retry
            },
        )
        .await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<T, IndexerError> {
        let response = self.http.get(url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            debug!(url, status = status.as_u16(), "Indexer returned error status");
            return Err(IndexerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

fn route_params(route: &Route) -> Vec<(&'static str, String)> {
    vec![
        ("token", route.token.to_string()),
        ("originChainId", route.origin_chain_id.to_string()),
        ("destinationChainId", route.destination_chain_id.to_string()),
    ]
}

impl DepositSource for IndexerClient {
    async fn fetch_deposit(&self, query: &DepositQuery) -> Result<DepositRecord, IndexerError> {
        match *query {
            DepositQuery::TxHash(tx_hash) => self.deposit_by_tx_hash(tx_hash).await,
            DepositQuery::Key(key) => self.deposit_status(key).await,
        }
    }
}

impl QuoteSource for IndexerClient {
    async fn limits(&self, route: &Route) -> Result<Limits, IndexerError> {
        self.route_limits(route).await
    }

    async fn suggested_fee(&self, route: &Route, amount: U256) -> Result<FeePct, IndexerError> {
        self.suggested_relayer_fee(route, amount).await
    }
}
