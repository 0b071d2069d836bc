//! Common test setup utilities shared across integration tests.
#![allow(dead_code)]

use client::{GatewayError, RpcTransport};
use deposit::{Clock, ResolverConfig, ResolverHandle, ResolverService, StatusUpdate};
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Recording {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

/// Transport that sleeps before answering and records what it saw.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Recording>,
}

impl RecordingTransport {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Arc::new(Recording {
                delay,
                ..Default::default()
            }),
        }
    }

    pub fn peak(&self) -> usize {
        self.state.peak.load(Ordering::SeqCst)
    }

    /// Methods in the order they started executing.
    pub fn started(&self) -> Vec<String> {
        self.state.started.lock().unwrap().clone()
    }
}

impl RpcTransport for RecordingTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let state = &self.state;
        state.started.lock().unwrap().push(method.to_string());
        let now = state.active.fetch_add(1, Ordering::SeqCst) + 1;
        state.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(state.delay).await;

        state.active.fetch_sub(1, Ordering::SeqCst);
        if method == "fail" {
            return Err(GatewayError::Rpc {
                method: method.to_string(),
                message: "boom".to_string(),
            });
        }
        Ok(json!({ "method": method, "params": params }))
    }
}

pub fn fixed_clock(now: Arc<AtomicU64>) -> Clock {
    Arc::new(move || now.load(Ordering::SeqCst))
}

/// A resolver with default config and a re-evaluation tick far in the future.
pub fn spawn_resolver(
    now: Arc<AtomicU64>,
    cancel: CancellationToken,
) -> (ResolverHandle, JoinHandle<()>) {
    ResolverService::spawn(
        ResolverConfig::default(),
        Duration::from_secs(3600),
        fixed_clock(now),
        cancel,
    )
}

/// Receive updates until one matches `predicate`.
pub async fn wait_for_update(
    updates: &mut broadcast::Receiver<StatusUpdate>,
    predicate: impl Fn(&StatusUpdate) -> bool,
) -> StatusUpdate {
    loop {
        let update = updates.recv().await.expect("resolver stopped");
        if predicate(&update) {
            return update;
        }
    }
}
