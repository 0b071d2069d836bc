//! Rate-limited request gateway.
//!
//! A [`Gateway`] admits at most `max_concurrency` calls against one endpoint at a
//! time. Callers beyond the cap wait in an unbounded FIFO backlog; the next waiter is
//! admitted as soon as any in-flight call settles. The gateway never retries and never
//! rewrites a call: each caller gets back exactly what its own request produced.

use alloy_provider::Provider;
use metrics::{counter, gauge, Gauge};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::{
    borrow::Cow,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The upstream call failed (transport error, JSON-RPC error object, timeout)
    #[error("rpc call {method} failed: {message}")]
    Rpc { method: String, message: String },

    /// Params could not be encoded or the result could not be decoded
    #[error("failed to decode {method} response: {message}")]
    Decode { method: String, message: String },

    /// The gateway was shut down before the request was admitted
    #[error("request cancelled: gateway {0} is shut down")]
    Cancelled(String),
}

/// A JSON-RPC transport: `(method, params) -> result`.
pub trait RpcTransport: Send + Sync + 'static {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, GatewayError>> + Send;
}

/// [`RpcTransport`] backed by an alloy provider.
#[derive(Debug, Clone)]
pub struct AlloyTransport<P> {
    provider: P,
}

impl<P> AlloyTransport<P>
where
    P: Provider + Clone,
{
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P> RpcTransport for AlloyTransport<P>
where
    P: Provider + Clone + 'static,
{
    async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        self.provider
            .raw_request::<Value, Value>(Cow::Owned(method.to_string()), params)
            .await
            .map_err(|e| GatewayError::Rpc {
                method: method.to_string(),
                message: e.to_string(),
            })
    }
}

/// Keeps an atomic count and its gauge in step for the lifetime of the guard.
struct Tally<'a> {
    count: &'a AtomicUsize,
    gauge: Gauge,
}

impl<'a> Tally<'a> {
    fn enter(count: &'a AtomicUsize, gauge: Gauge) -> Self {
        count.fetch_add(1, Ordering::SeqCst);
        gauge.increment(1.0);
        Self { count, gauge }
    }
}

impl Drop for Tally<'_> {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
        self.gauge.decrement(1.0);
    }
}

/// Bounded-concurrency front for one RPC endpoint.
pub struct Gateway<T> {
    endpoint: String,
    transport: T,
    permits: Semaphore,
    max_concurrency: usize,
    in_flight: AtomicUsize,
    queued: AtomicUsize,
}

impl<T> Gateway<T>
where
    T: RpcTransport,
{
    /// Create a gateway; a `max_concurrency` of zero is treated as one.
    pub fn new(endpoint: impl Into<String>, transport: T, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            endpoint: endpoint.into(),
            transport,
            // tokio's semaphore is fair: waiters are admitted in request order
            permits: Semaphore::new(max_concurrency),
            max_concurrency,
            in_flight: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Requests currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Requests waiting for admission.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Submit a raw JSON-RPC request and wait for its own result.
    pub async fn submit(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let permit = {
            let _waiting = Tally::enter(
                &self.queued,
                gauge!("gateway_queued_requests", "endpoint" => self.endpoint.clone()),
            );
            self.permits.acquire().await
        };

        let Ok(_permit) = permit else {
            debug!(endpoint = %self.endpoint, method, "Rejecting queued request after shutdown");
            counter!("gateway_requests_total", "endpoint" => self.endpoint.clone(), "outcome" => "cancelled")
                .increment(1);
            return Err(GatewayError::Cancelled(self.endpoint.clone()));
        };

        let _running = Tally::enter(
            &self.in_flight,
            gauge!("gateway_in_flight_requests", "endpoint" => self.endpoint.clone()),
        );
        trace!(endpoint = %self.endpoint, method, "Request admitted");

        let result = self.transport.request(method, params).await;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("gateway_requests_total", "endpoint" => self.endpoint.clone(), "outcome" => outcome)
            .increment(1);

        result
    }

    /// Typed wrapper over [`Gateway::submit`].
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, GatewayError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let decode_error = |e: serde_json::Error| GatewayError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        };

        let params = serde_json::to_value(params).map_err(decode_error)?;
        let value = self.submit(method, params).await?;
        serde_json::from_value(value).map_err(decode_error)
    }

    /// Stop admitting requests. Queued requests settle with [`GatewayError::Cancelled`];
    /// requests already in flight run to completion.
    pub fn shutdown(&self) {
        debug!(endpoint = %self.endpoint, queued = self.queued(), "Shutting down gateway");
        self.permits.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.permits.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use serde_json::json;
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    /// Transport that records concurrency and start order.
    #[derive(Default)]
    struct Probe {
        current: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    impl RpcTransport for Probe {
        async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(method.to_string());

            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if method.starts_with("fail") {
                Err(GatewayError::Rpc {
                    method: method.to_string(),
                    message: "boom".to_string(),
                })
            } else {
                Ok(params)
            }
        }
    }

    #[tokio::test]
    async fn test_never_exceeds_max_concurrency() {
        let gateway = Gateway::new("test", Probe::default(), 3);

        let calls = (0..25).map(|i| gateway.submit("eth_call", json!([i])));
        let results = join_all(calls).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(gateway.transport.peak.load(Ordering::SeqCst), 3);
        assert_eq!(gateway.in_flight(), 0);
        assert_eq!(gateway.queued(), 0);
    }

    #[tokio::test]
    async fn test_admits_in_fifo_order() {
        let gateway = Gateway::new("test", Probe::default(), 1);

        join_all(["t1", "t2", "t3"].map(|m| gateway.submit(m, json!([])))).await;

        let started = gateway.transport.started.lock().unwrap().clone();
        assert_eq!(started, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_results_routed_to_own_caller() {
        let gateway = Gateway::new("test", Probe::default(), 2);

        let results = join_all([
            gateway.submit("a", json!([1])),
            gateway.submit("fail_b", json!([2])),
            gateway.submit("c", json!([3])),
        ])
        .await;

        assert_eq!(results[0], Ok(json!([1])));
        assert!(matches!(results[1], Err(GatewayError::Rpc { .. })));
        assert_eq!(results[2], Ok(json!([3])));
    }

    #[tokio::test]
    async fn test_typed_call_decodes_result() {
        let gateway = Gateway::new("test", Probe::default(), 1);

        let echoed: Vec<u64> = gateway.call("eth_echo", [7u64, 8u64]).await.unwrap();
        assert_eq!(echoed, vec![7, 8]);

        let wrong: Result<String, _> = gateway.call("eth_echo", [1u64]).await;
        assert!(matches!(wrong, Err(GatewayError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_queued_requests() {
        let gateway = Arc::new(Gateway::new("test", Probe::default(), 1));

        let first = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.submit("first", json!([])).await }
        });
        while gateway.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let second = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.submit("second", json!([])).await }
        });
        while gateway.queued() == 0 {
            tokio::task::yield_now().await;
        }

        gateway.shutdown();

        assert!(first.await.unwrap().is_ok());
        assert_eq!(
            second.await.unwrap(),
            Err(GatewayError::Cancelled("test".to_string()))
        );
        assert!(gateway.is_shut_down());
    }
}
