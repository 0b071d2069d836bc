//! Prometheus metrics for the tracker.
//!
//! Library crates emit through the `metrics` facade; [`Metrics`] registers every
//! description once and records the tracker's own series.

use deposit::{DepositStatus, Fact, StatusUpdate};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Aggregated metrics for the tracker.
///
/// Metrics are registered with the global metrics registry on creation.
#[derive(Debug, Clone)]
pub struct Metrics {
    _private: (),
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::register_descriptions();
        Self { _private: () }
    }

    fn register_descriptions() {
        // Gateway
        describe_gauge!(
            "gateway_in_flight_requests",
            "RPC requests currently executing, by endpoint"
        );
        describe_gauge!(
            "gateway_queued_requests",
            "RPC requests waiting for admission, by endpoint"
        );
        describe_counter!(
            "gateway_requests_total",
            "RPC requests settled, by endpoint and outcome"
        );

        // Sync engine
        describe_counter!("sync_scans_total", "Chain scans, by chain and outcome");
        describe_gauge!("sync_last_synced_block", "Sync floor, by chain");

        // Indexer
        describe_counter!("indexer_fetches_total", "Indexer deposit fetches by outcome");
        describe_gauge!(
            "tracker_indexer_polls",
            "Deposits with a running indexer refetch loop"
        );

        // Resolver
        describe_counter!("tracker_facts_total", "Facts forwarded to the resolver, by source");
        describe_counter!(
            "tracker_status_updates_total",
            "Published resolution changes, by status"
        );
        describe_counter!(
            "tracker_deposits_terminal_total",
            "Deposits that reached a terminal status, by status"
        );
        describe_histogram!(
            "tracker_fill_time_seconds",
            "Seconds from deposit to fill for filled deposits"
        );
    }

    pub fn record_fact(&self, fact: &Fact) {
        let source = match fact {
            Fact::Chain(_) => "chain",
            Fact::Indexer { .. } => "indexer",
            Fact::SuggestedFee { .. } => "suggested_fee",
            Fact::Limits { .. } => "limits",
        };
        counter!("tracker_facts_total", "source" => source).increment(1);
    }

    pub fn record_update(&self, update: &StatusUpdate) {
        let status = update.resolution.status;
        counter!("tracker_status_updates_total", "status" => status.as_str()).increment(1);

        if update.became_terminal() {
            counter!("tracker_deposits_terminal_total", "status" => status.as_str()).increment(1);

            if status == DepositStatus::Filled {
                if let Some(secs) = update.resolution.fill_time_secs {
                    histogram!("tracker_fill_time_seconds").record(secs as f64);
                }
            }
        }
    }

    pub fn set_indexer_polls(&self, count: usize) {
        gauge!("tracker_indexer_polls").set(count as f64);
    }
}

/// Install the Prometheus metrics exporter and start the HTTP server.
///
/// Returns an error if the server fails to bind to the specified port.
pub fn install_prometheus_exporter(port: u16) -> eyre::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| eyre::eyre!("Failed to install Prometheus exporter: {}", e))?;

    Ok(())
}
