//! In-memory chain fixture for pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use txscan_rpc::client::ChainReader;
use txscan_rpc::error::RpcError;
use txscan_rpc::types::{RawBlock, RawLog, RawReceipt, RawTransaction};

/// A scripted chain: blocks, transactions, receipts and logs are registered
/// up front and served back through the `ChainReader` seam.
pub struct MockChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, RawBlock>>,
    txs: Mutex<HashMap<String, RawTransaction>>,
    receipts: Mutex<HashMap<String, RawReceipt>>,
    logs: Mutex<Vec<RawLog>>,
    next_hash: AtomicU64,
    log_seq: Mutex<HashMap<u64, u32>>,
    fail_logs: AtomicBool,
}

impl MockChain {
    pub fn new(head: u64) -> Self {
        Self {
            head: AtomicU64::new(head),
            blocks: Mutex::new(HashMap::new()),
            txs: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            logs: Mutex::new(Vec::new()),
            next_hash: AtomicU64::new(1),
            log_seq: Mutex::new(HashMap::new()),
            fail_logs: AtomicBool::new(false),
        }
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::Relaxed);
    }

    /// Every RPC block carries a 12-second cadence from this epoch, so time
    /// window assertions in tests stay deterministic.
    pub const GENESIS_TS: u64 = 1_700_000_000;

    fn ensure_block(&self, number: u64) {
        self.blocks
            .lock()
            .unwrap()
            .entry(number)
            .or_insert_with(|| RawBlock {
                number: format!("0x{number:x}"),
                hash: format!("0xb{number:063x}"),
                parent_hash: format!("0xb{:063x}", number.saturating_sub(1)),
                timestamp: format!("0x{:x}", Self::GENESIS_TS + number * 12),
                gas_used: "0xb71b00".into(),
                gas_limit: "0x1c9c380".into(),
                miner: "0x9999999999999999999999999999999999999999".into(),
                base_fee_per_gas: Some("0x4a817c800".into()),
            });
    }

    /// Register a transaction with one log and a receipt; returns the hash.
    pub fn add_tx(
        &mut self,
        block: u64,
        index: u32,
        from: &str,
        to: &str,
        input: &str,
        success: bool,
    ) -> String {
        self.ensure_block(block);
        let n = self.next_hash.fetch_add(1, Ordering::Relaxed);
        let hash = format!("0x{n:064x}");

        self.txs.lock().unwrap().insert(
            hash.clone(),
            RawTransaction {
                hash: hash.clone(),
                block_number: Some(format!("0x{block:x}")),
                from: from.into(),
                to: Some(to.into()),
                value: "0xde0b6b3a7640000".into(), // 1 ETH
                gas_price: Some("0x6fc23ac00".into()), // 30 gwei
                input: input.into(),
            },
        );
        self.receipts.lock().unwrap().insert(
            hash.clone(),
            RawReceipt {
                tx_hash: hash.clone(),
                block_number: format!("0x{block:x}"),
                tx_index: format!("0x{index:x}"),
                gas_used: "0xc350".into(), // 50_000
                effective_gas_price: Some("0x5d21dba00".into()), // 25 gwei
                status: Some(if success { "0x1" } else { "0x0" }.into()),
            },
        );
        self.add_extra_log(&hash, block, u32::MAX);
        hash
    }

    /// Attach another log to an existing transaction. Pass `u32::MAX` to
    /// auto-assign the next free index in the block.
    pub fn add_extra_log(&mut self, hash: &str, block: u64, log_index: u32) {
        let index = if log_index == u32::MAX {
            let mut seq = self.log_seq.lock().unwrap();
            let next = seq.entry(block).or_insert(0);
            let i = *next;
            *next += 1;
            i
        } else {
            log_index
        };
        self.logs.lock().unwrap().push(RawLog {
            address: "0xC0FFEE254729296a45a3885639AC7E10F9d54979".into(),
            topics: vec![
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".into(),
            ],
            data: "0x".into(),
            block_number: format!("0x{block:x}"),
            tx_hash: hash.into(),
            log_index: format!("0x{index:x}"),
            removed: Some(false),
        });
    }

    pub fn drop_receipt(&mut self, hash: &str) {
        self.receipts.lock().unwrap().remove(hash);
    }

    pub fn fail_logs(&mut self) {
        self.fail_logs.store(true, Ordering::Relaxed);
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        Ok(self.head.load(Ordering::Relaxed))
    }

    async fn get_block(&self, number: u64) -> Result<Option<RawBlock>, RpcError> {
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        _addresses: &[String],
    ) -> Result<Vec<RawLog>, RpcError> {
        if self.fail_logs.load(Ordering::Relaxed) {
            return Err(RpcError::Status {
                status: 503,
                body: "node unavailable".into(),
            });
        }
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| {
                let n = l.block_number_u64();
                n >= from && n <= to
            })
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, RpcError> {
        Ok(self.txs.lock().unwrap().get(hash).cloned())
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<RawReceipt>, RpcError> {
        Ok(self.receipts.lock().unwrap().get(hash).cloned())
    }
}
