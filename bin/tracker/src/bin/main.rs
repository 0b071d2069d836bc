use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracker::{
    config::Config,
    metrics::{install_prometheus_exporter, Metrics},
};

#[derive(Parser)]
#[command(name = "tracker")]
#[command(about = "Track Across deposit status across chains and the indexer")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Prometheus exporter port, overrides `metrics_port`
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Loading config: {}", cli.config.display());
    let mut config = Config::from_file(&cli.config)?;
    if let Some(port) = cli.metrics_port {
        config.metrics_port = port;
    }

    info!("Loaded config:");
    for chain in &config.chains {
        info!(
            "  Chain {} ({}): lower bound {}",
            chain.chain_id, chain.name, chain.lower_bound_block
        );
    }
    info!("  Indexer: {}", config.indexer.base_url);
    info!("  Metrics port: {}", config.metrics_port);

    install_prometheus_exporter(config.metrics_port)?;
    let metrics = Metrics::new();

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    tracker::run(config, metrics, cancel).await?;

    info!("Tracker stopped");
    Ok(())
}
