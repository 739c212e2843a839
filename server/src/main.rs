//! txscan-server: wires config, store, RPC client, indexer and the HTTP
//! router together and serves until terminated.
//!
//! All configuration comes from the environment (a local `.env` file is
//! honored). `TXSCAN_RPC_URL`, `TXSCAN_ADDRESSES` and `TXSCAN_CRON_SECRET`
//! are required; everything else has a default.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use txscan_api::AppState;
use txscan_core::config::IndexerConfig;
use txscan_indexer::{Indexer, MethodClassifier};
use txscan_rpc::client::ChainClient;
use txscan_storage::Store;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} has an unparseable value: {raw}")),
    }
}

fn config_from_env() -> Result<IndexerConfig> {
    let rpc_url = std::env::var("TXSCAN_RPC_URL").context("TXSCAN_RPC_URL is not set")?;
    let addresses: Vec<String> = env_or("TXSCAN_ADDRESSES", "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let defaults = IndexerConfig::default();
    Ok(IndexerConfig {
        rpc_url,
        monitored_addresses: addresses,
        start_block: env_parse("TXSCAN_START_BLOCK", defaults.start_block)?,
        chunk_size: env_parse("TXSCAN_CHUNK_SIZE", defaults.chunk_size)?,
        overlap_blocks: env_parse("TXSCAN_OVERLAP_BLOCKS", defaults.overlap_blocks)?,
        finality_depth: env_parse("TXSCAN_FINALITY_DEPTH", defaults.finality_depth)?,
        max_txs_per_run: env_parse("TXSCAN_MAX_TXS_PER_RUN", defaults.max_txs_per_run)?,
        max_inflight: env_parse("TXSCAN_MAX_INFLIGHT", defaults.max_inflight)?,
        lease_ttl_secs: env_parse("TXSCAN_LEASE_TTL_SECS", defaults.lease_ttl_secs)?,
    })
}

fn classifier_from_env() -> Result<MethodClassifier> {
    match std::env::var("TXSCAN_ABI_PATH") {
        Err(_) => Ok(MethodClassifier::new()),
        Ok(path) => {
            let abi_json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading ABI file {path}"))?;
            Ok(MethodClassifier::from_abi_json(&abi_json)?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env()?;
    if let Err(e) = config.validate() {
        bail!("invalid configuration: {e}");
    }
    let cron_secret = std::env::var("TXSCAN_CRON_SECRET")
        .context("TXSCAN_CRON_SECRET is not set")?;
    if cron_secret.is_empty() {
        bail!("TXSCAN_CRON_SECRET must not be empty");
    }

    let database = env_or("TXSCAN_DATABASE", "./txscan.db");
    let store = Store::open(&database).await?;
    tracing::info!(%database, "store opened");

    let reader = ChainClient::default_for(config.rpc_url.as_str()).context("building rpc client")?;
    let classifier = classifier_from_env()?;
    let indexer = Indexer::new(config, Arc::new(reader), store.clone(), classifier);

    let state = AppState {
        indexer: Arc::new(indexer),
        store,
        cron_secret,
    };

    let bind = env_or("TXSCAN_BIND", "0.0.0.0:3000");
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "txscan-server listening");

    axum::serve(listener, txscan_api::router(state)).await?;
    Ok(())
}
