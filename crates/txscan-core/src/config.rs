//! Indexer configuration.
//!
//! One explicit struct passed into the indexer's constructor, so multiple
//! independent instances (e.g. per chain) can coexist without shared global
//! state.

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Contract addresses whose activity is indexed (`0x…`, case-insensitive).
    pub monitored_addresses: Vec<String>,
    /// Block to start from when no cursor exists yet.
    pub start_block: u64,
    /// Maximum blocks scanned per run.
    pub chunk_size: u64,
    /// Trailing blocks re-scanned each run for reorg safety.
    pub overlap_blocks: u64,
    /// Confirmations after which a transaction is flagged finalized.
    pub finality_depth: u64,
    /// Maximum transactions processed in a single run; if exceeded the run
    /// stops early at a block boundary.
    pub max_txs_per_run: usize,
    /// Maximum concurrent RPC fetches for independent hashes.
    pub max_inflight: usize,
    /// Seconds a run lease on the cursor row remains valid.
    pub lease_ttl_secs: i64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            monitored_addresses: vec![],
            start_block: 0,
            chunk_size: 2_000,
            overlap_blocks: 10,
            finality_depth: 15,
            max_txs_per_run: 3_000,
            max_inflight: 8,
            lease_ttl_secs: 240,
        }
    }
}

impl IndexerConfig {
    /// Validate the parts that cannot be defaulted.
    ///
    /// A missing RPC endpoint or an empty monitored-address set is a
    /// configuration error: the entry point must fail before attempting any
    /// work.
    pub fn validate(&self) -> Result<(), IndexError> {
        if self.rpc_url.is_empty() {
            return Err(IndexError::Config("rpc_url is not set".into()));
        }
        if self.monitored_addresses.is_empty() {
            return Err(IndexError::Config(
                "monitored_addresses is empty — nothing to index".into(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(IndexError::Config("chunk_size must be at least 1".into()));
        }
        if self.max_inflight == 0 {
            return Err(IndexError::Config("max_inflight must be at least 1".into()));
        }
        Ok(())
    }
}
