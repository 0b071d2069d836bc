//! One-shot deposit status lookup.
//!
//! Fetches a deposit from the indexer together with its route limits and live fee
//! quote, resolves it once and prints the result as JSON.

use alloy_primitives::{B256, U256};
use clap::{ArgGroup, Parser};
use deposit::{resolve, system_clock, DepositKey};
use indexer::{DepositQuery, DepositSource, IndexerClient, QuoteSource};
use serde_json::json;
use std::{path::PathBuf, str::FromStr};
use tracing::{info, warn};
use tracker::config::Config;

#[derive(Parser)]
#[command(name = "status")]
#[command(about = "Resolve the current status of one deposit")]
#[command(group(ArgGroup::new("lookup").required(true).args(["tx_hash", "origin_chain_id"])))]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Deposit transaction hash
    #[arg(long)]
    tx_hash: Option<String>,

    /// Origin chain of the deposit
    #[arg(long, requires = "deposit_id")]
    origin_chain_id: Option<u64>,

    /// Deposit id on the origin chain
    #[arg(long, requires = "origin_chain_id")]
    deposit_id: Option<String>,
}

impl Cli {
    fn query(&self) -> eyre::Result<DepositQuery> {
        if let Some(hash) = &self.tx_hash {
            let hash = B256::from_str(hash).map_err(|e| eyre::eyre!("invalid tx hash: {e}"))?;
            return Ok(DepositQuery::TxHash(hash));
        }

        let (Some(origin_chain_id), Some(deposit_id)) = (self.origin_chain_id, &self.deposit_id)
        else {
            eyre::bail!("either --tx-hash or --origin-chain-id with --deposit-id is required");
        };
        let deposit_id =
            U256::from_str(deposit_id).map_err(|e| eyre::eyre!("invalid deposit id: {e}"))?;

        Ok(DepositQuery::Key(DepositKey::new(origin_chain_id, deposit_id)))
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    let query = cli.query()?;

    let indexer = IndexerClient::from_settings(&config.indexer)?;
    info!("Fetching {:?} from {}", query, indexer.base_url());

    let record = indexer.fetch_deposit(&query).await?;
    let observation = record.observation();
    let Some(mut deposit) = record.to_deposit() else {
        eyre::bail!(
            "indexer record for {:?} lacks route details (status: {})",
            query,
            record.status
        );
    };

    let route = deposit.route();
    let limits = match indexer.limits(&route).await {
        Ok(limits) => Some(limits),
        Err(e) => {
            warn!("Limits unavailable: {}", e);
            None
        }
    };
    match indexer.suggested_fee(&route, deposit.input_amount).await {
        Ok(fee) => deposit.suggested_relayer_fee_pct = Some(fee),
        Err(e) => warn!("Suggested fee unavailable: {}", e),
    }

    let now = system_clock()();
    let resolution = resolve(
        &deposit,
        Some(&observation),
        limits.as_ref(),
        &config.resolver_config()?,
        now,
    );

    let output = json!({
        "deposit": deposit,
        "observation": observation,
        "limits": limits,
        "resolution": resolution,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
