//! Canonical row types persisted by the indexer.

use serde::{Deserialize, Serialize};

// ─── BlockRecord ─────────────────────────────────────────────────────────────

/// A normalized block row, keyed by `number`.
///
/// Immutable once a deeper block confirms it; a re-scan of the reorg overlap
/// window may overwrite it with the replacement fork's header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    /// Total gas used by all transactions in the block.
    pub gas_used: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Coinbase / fee recipient address.
    pub miner: String,
    /// EIP-1559 base fee in wei, absent on pre-London blocks.
    pub base_fee_per_gas: Option<u64>,
}

// ─── TransactionRecord ───────────────────────────────────────────────────────

/// Execution status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
    Pending,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A normalized transaction row, keyed by `hash`.
///
/// Upsert-by-hash makes repeated processing of the same transaction a no-op
/// write rather than a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash (`0x…`).
    pub hash: String,
    /// Number of the containing block.
    pub block_number: u64,
    /// Position within the block (from the receipt).
    pub tx_index: u32,
    /// Sender address.
    pub from: String,
    /// Recipient address; `None` for contract creation.
    pub to: Option<String>,
    /// Transferred value in wei, as a decimal string (may exceed u64).
    pub value: String,
    /// Gas actually consumed (from the receipt).
    pub gas_used: u64,
    /// Gas price offered by the sender, in wei.
    pub gas_price: u64,
    /// Gas price actually paid, in wei (EIP-1559 effective price).
    pub effective_gas_price: u64,
    /// Decoded call label, or a best-effort fallback
    /// (`unknown_contract_call` / `transfer`).
    pub method: String,
    /// Execution status.
    pub status: TxStatus,
    /// Set once the block is `finality_depth` behind head. Monotonic:
    /// transitions false→true only.
    pub finalized: bool,
}

impl TransactionRecord {
    /// Total fee paid, denominated in gwei so rollup sums fit in i64.
    pub fn gas_cost_gwei(&self) -> u64 {
        let wei = self.gas_used as u128 * self.effective_gas_price as u128;
        (wei / 1_000_000_000) as u64
    }
}

// ─── LogRecord ───────────────────────────────────────────────────────────────

/// A normalized log row, keyed by `(tx_hash, log_index)`.
///
/// Only logs emitted by monitored contracts are retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Hash of the owning transaction.
    pub tx_hash: String,
    /// Log index within the block.
    pub log_index: u32,
    /// Number of the containing block.
    pub block_number: u64,
    /// Emitting contract address.
    pub address: String,
    /// Indexed topics (`0x…` each).
    pub topics: Vec<String>,
    /// ABI-encoded log data (`0x…`).
    pub data: String,
    /// `true` if the node flagged the log as removed by a reorg.
    pub removed: bool,
}

// ─── CallClassification ──────────────────────────────────────────────────────

/// Outcome of classifying a transaction's calldata.
///
/// The fallback cascade is explicit so it can be tested independently of the
/// decode library: full ABI decode, then the 4-byte heuristic table, then a
/// catch-all label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallClassification {
    /// Calldata decoded cleanly against the configured ABI.
    Decoded(String),
    /// Selector matched the heuristic table; inputs were not decoded.
    KnownSelector(String),
    /// Input data present but the selector is unrecognized.
    UnknownSelector([u8; 4]),
    /// No input data — a plain value transfer.
    NoInput,
}

impl CallClassification {
    /// The `method` label stored on the transaction row.
    pub fn label(&self) -> String {
        match self {
            Self::Decoded(name) | Self::KnownSelector(name) => name.clone(),
            Self::UnknownSelector(_) => "unknown_contract_call".into(),
            Self::NoInput => "transfer".into(),
        }
    }

    /// The raw selector, when one was present.
    pub fn selector(&self) -> Option<[u8; 4]> {
        match self {
            Self::UnknownSelector(sel) => Some(*sel),
            _ => None,
        }
    }
}

impl std::fmt::Display for CallClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decoded(name) => write!(f, "decoded:{name}"),
            Self::KnownSelector(name) => write!(f, "selector:{name}"),
            Self::UnknownSelector(sel) => write!(f, "unknown:0x{}", hex::encode(sel)),
            Self::NoInput => write!(f, "transfer"),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
