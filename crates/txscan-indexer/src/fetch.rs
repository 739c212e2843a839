//! Chunk fetcher: logs first, then blocks and tx/receipt pairs.
//!
//! `eth_getLogs` over the window discovers which transactions touched the
//! monitored contracts; only those are fetched in full. Independent hashes
//! are fetched with bounded concurrency and joined before anything is
//! persisted, so a run writes either a complete chunk or nothing.

use std::collections::{BTreeMap, HashSet};

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, warn};

use txscan_core::error::IndexError;
use txscan_core::scanner::ScanWindow;
use txscan_core::types::{BlockRecord, LogRecord, TransactionRecord, TxStatus};
use txscan_rpc::client::ChainReader;
use txscan_rpc::error::RpcError;
use txscan_rpc::types::{parse_hex_u64, RawBlock, RawLog};

use crate::classify::MethodClassifier;

fn rpc_err(e: RpcError) -> IndexError {
    IndexError::Rpc(e.to_string())
}

/// Everything fetched and normalized for one window, ready to upsert.
#[derive(Debug, Default)]
pub struct FetchedChunk {
    pub blocks: Vec<BlockRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub logs: Vec<LogRecord>,
    /// Last block actually covered. Equals the window's `to` unless the
    /// per-run transaction cap cut the chunk short at a block boundary.
    pub effective_to: u64,
    /// `true` when the cap truncated the window.
    pub truncated: bool,
}

/// Fetch and normalize one scan window.
///
/// When the discovered transactions exceed `max_txs`, the chunk is cut at
/// the last whole block that fits (never mid-block, so `effective_to` stays
/// a safe checkpoint). At least one block is always included, even if that
/// single block alone exceeds the cap.
pub async fn fetch_window(
    reader: &dyn ChainReader,
    classifier: &MethodClassifier,
    window: ScanWindow,
    addresses: &[String],
    max_txs: usize,
    max_inflight: usize,
) -> Result<FetchedChunk, IndexError> {
    let raw_logs = reader
        .get_logs(window.from, window.to, addresses)
        .await
        .map_err(rpc_err)?;

    // Group discovered tx hashes by block, preserving log order and
    // deduplicating (one tx often emits several logs).
    let mut by_block: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    let mut seen = HashSet::new();
    for log in &raw_logs {
        if seen.insert(log.tx_hash.clone()) {
            by_block
                .entry(log.block_number_u64())
                .or_default()
                .push(log.tx_hash.clone());
        }
    }

    // Apply the per-run cap at a block boundary.
    let mut hashes: Vec<String> = Vec::new();
    let mut effective_to = window.to;
    let mut truncated = false;
    for (block, block_hashes) in &by_block {
        if !hashes.is_empty() && hashes.len() + block_hashes.len() > max_txs {
            effective_to = block - 1;
            truncated = true;
            break;
        }
        hashes.extend(block_hashes.iter().cloned());
    }

    if truncated {
        debug!(
            from = window.from,
            to = window.to,
            effective_to,
            txs = hashes.len(),
            "transaction cap reached, window truncated"
        );
    }

    let block_numbers: Vec<u64> = by_block
        .keys()
        .copied()
        .filter(|n| *n <= effective_to)
        .collect();

    // Block headers and tx/receipt pairs are independent per hash; fetch
    // them with bounded concurrency and join before returning.
    let raw_blocks: Vec<Option<RawBlock>> = stream::iter(block_numbers.iter().copied())
        .map(|number| async move { reader.get_block(number).await })
        .buffer_unordered(max_inflight)
        .try_collect()
        .await
        .map_err(rpc_err)?;

    let mut blocks: Vec<BlockRecord> = raw_blocks
        .into_iter()
        .flatten()
        .map(normalize_block)
        .collect();
    blocks.sort_by_key(|b| b.number);

    if blocks.len() < block_numbers.len() {
        warn!(
            expected = block_numbers.len(),
            got = blocks.len(),
            "node returned null for some block headers"
        );
    }

    let pairs: Vec<Option<TransactionRecord>> = stream::iter(hashes.iter().cloned())
        .map(|hash| async move {
            let tx = reader.get_transaction(&hash).await?;
            let receipt = reader.get_transaction_receipt(&hash).await?;
            Ok::<_, RpcError>(tx.map(|tx| normalize_tx(classifier, tx, receipt)))
        })
        .buffer_unordered(max_inflight)
        .try_collect()
        .await
        .map_err(rpc_err)?;

    let mut transactions: Vec<TransactionRecord> = pairs.into_iter().flatten().collect();
    transactions.sort_by(|a, b| (a.block_number, a.tx_index).cmp(&(b.block_number, b.tx_index)));

    // Only keep logs whose owning transaction was actually fetched, so a
    // log row never dangles.
    let kept: HashSet<&str> = transactions.iter().map(|t| t.hash.as_str()).collect();
    let logs: Vec<LogRecord> = raw_logs
        .iter()
        .filter(|l| kept.contains(l.tx_hash.as_str()))
        .map(normalize_log)
        .collect();

    Ok(FetchedChunk {
        blocks,
        transactions,
        logs,
        effective_to,
        truncated,
    })
}

fn normalize_block(raw: RawBlock) -> BlockRecord {
    BlockRecord {
        number: raw.number_u64(),
        hash: raw.hash.clone(),
        parent_hash: raw.parent_hash.clone(),
        timestamp: parse_hex_u64(&raw.timestamp) as i64,
        gas_used: parse_hex_u64(&raw.gas_used),
        gas_limit: parse_hex_u64(&raw.gas_limit),
        miner: raw.miner.to_lowercase(),
        base_fee_per_gas: raw.base_fee_per_gas.as_deref().map(parse_hex_u64),
    }
}

fn normalize_tx(
    classifier: &MethodClassifier,
    raw: txscan_rpc::types::RawTransaction,
    receipt: Option<txscan_rpc::types::RawReceipt>,
) -> TransactionRecord {
    let method = classifier.classify(&raw.input_bytes()).label();
    let gas_price = raw.gas_price.as_deref().map(parse_hex_u64).unwrap_or(0);

    let (tx_index, gas_used, effective_gas_price, status) = match &receipt {
        Some(r) => (
            parse_hex_u64(&r.tx_index) as u32,
            parse_hex_u64(&r.gas_used),
            r.effective_gas_price
                .as_deref()
                .map(parse_hex_u64)
                .unwrap_or(gas_price),
            match r.succeeded() {
                Some(true) => TxStatus::Success,
                Some(false) => TxStatus::Failed,
                None => TxStatus::Pending,
            },
        ),
        // Receipt not yet available: record what the tx object carries and
        // let the overlap re-scan fill in the rest.
        None => (0, 0, gas_price, TxStatus::Pending),
    };

    TransactionRecord {
        hash: raw.hash.clone(),
        block_number: raw.block_number.as_deref().map(parse_hex_u64).unwrap_or(0),
        tx_index,
        from: raw.from.to_lowercase(),
        to: raw.to.as_deref().map(str::to_lowercase),
        value: raw.value_decimal(),
        gas_used,
        gas_price,
        effective_gas_price,
        method,
        status,
        finalized: false,
    }
}

fn normalize_log(raw: &RawLog) -> LogRecord {
    LogRecord {
        tx_hash: raw.tx_hash.clone(),
        log_index: raw.log_index_u32(),
        block_number: raw.block_number_u64(),
        address: raw.address.to_lowercase(),
        topics: raw.topics.clone(),
        data: raw.data.clone(),
        removed: raw.is_removed(),
    }
}
