//! Single-run orchestrator.
//!
//! One invocation does one bounded unit of work and returns. The cursor is
//! written exactly once per run: advanced after all rows for the chunk are
//! committed, or stamped with the error on abort. Overlapping invocations
//! are excluded by the lease on the cursor row.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument};

use txscan_core::config::IndexerConfig;
use txscan_core::cursor::IndexCursor;
use txscan_core::error::IndexError;
use txscan_core::scanner::next_window;
use txscan_rpc::client::ChainReader;
use txscan_storage::Store;

use crate::classify::MethodClassifier;
use crate::fetch::fetch_window;

/// Outcome of one completed run, returned to the trigger caller.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Chain head observed at the start of the run.
    pub head_block_number: u64,
    /// Cursor position after the run.
    pub last_block_number: u64,
    pub blocks_upserted: usize,
    pub transactions_upserted: usize,
    pub logs_upserted: usize,
    /// Transactions newly flagged finalized this run.
    pub newly_finalized: u64,
    /// `true` when the per-run transaction cap cut the window short.
    pub truncated: bool,
}

/// Chunked incremental indexer over a `ChainReader` and a `Store`.
pub struct Indexer {
    config: IndexerConfig,
    reader: Arc<dyn ChainReader>,
    store: Store,
    classifier: MethodClassifier,
}

impl Indexer {
    pub fn new(
        config: IndexerConfig,
        reader: Arc<dyn ChainReader>,
        store: Store,
        classifier: MethodClassifier,
    ) -> Self {
        Self {
            config,
            reader,
            store,
            classifier,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Execute one index run.
    ///
    /// Acquires the run lease, scans the next window, persists the chunk,
    /// advances the cursor and releases the lease. On failure the cursor
    /// keeps its position with `status = error`, so the next scheduled
    /// invocation retries the same range.
    #[instrument(skip(self), fields(start_block = self.config.start_block))]
    pub async fn run_once(&self) -> Result<RunReport, IndexError> {
        self.config.validate()?;
        let now = Utc::now();

        let acquired = self
            .store
            .try_lock_cursor(self.config.start_block, now, self.config.lease_ttl_secs)
            .await?;
        if !acquired {
            let locked_until = self
                .store
                .lease_expiry()
                .await?
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "unknown".into());
            return Err(IndexError::LeaseHeld { locked_until });
        }

        let cursor = match self.store.load_cursor().await? {
            Some(c) => c,
            None => IndexCursor::starting_at(self.config.start_block, now),
        };

        let outcome = self.run_locked(&cursor).await;
        match outcome {
            Ok(report) => {
                self.store.unlock_cursor().await?;
                info!(
                    head = report.head_block_number,
                    cursor = report.last_block_number,
                    txs = report.transactions_upserted,
                    finalized = report.newly_finalized,
                    truncated = report.truncated,
                    "index run complete"
                );
                Ok(report)
            }
            Err(e) => {
                error!(error = %e, cursor = cursor.last_block_number, "index run failed");
                // Best effort: the error itself is what propagates.
                let _ = self
                    .store
                    .save_cursor(&cursor.errored(e.to_string(), Utc::now()))
                    .await;
                let _ = self.store.unlock_cursor().await;
                Err(e)
            }
        }
    }

    async fn run_locked(&self, cursor: &IndexCursor) -> Result<RunReport, IndexError> {
        let head = self
            .reader
            .latest_block_number()
            .await
            .map_err(|e| IndexError::Rpc(e.to_string()))?;

        let window = match next_window(
            cursor.last_block_number,
            head,
            self.config.chunk_size,
            self.config.overlap_blocks,
        ) {
            Some(w) => w,
            None => {
                // Caught up. Persist head so the checkpoint reflects it.
                let advanced = cursor.advanced(head, Utc::now());
                self.store.save_cursor(&advanced).await?;
                return Ok(RunReport {
                    head_block_number: head,
                    last_block_number: advanced.last_block_number,
                    blocks_upserted: 0,
                    transactions_upserted: 0,
                    logs_upserted: 0,
                    newly_finalized: 0,
                    truncated: false,
                });
            }
        };

        info!(from = window.from, to = window.to, head, "scanning window");

        let chunk = fetch_window(
            self.reader.as_ref(),
            &self.classifier,
            window,
            &self.config.monitored_addresses,
            self.config.max_txs_per_run,
            self.config.max_inflight,
        )
        .await?;

        self.store.upsert_blocks(&chunk.blocks).await?;
        self.store.upsert_transactions(&chunk.transactions).await?;
        self.store.upsert_logs(&chunk.logs).await?;

        let cutoff = head.saturating_sub(self.config.finality_depth);
        let newly_finalized = self.store.mark_finalized(cutoff).await?;

        self.store.refresh_aggregates(Utc::now()).await?;

        // The cursor moves only after every row of the chunk is committed.
        let advanced = cursor.advanced(chunk.effective_to, Utc::now());
        self.store.save_cursor(&advanced).await?;

        Ok(RunReport {
            head_block_number: head,
            last_block_number: advanced.last_block_number,
            blocks_upserted: chunk.blocks.len(),
            transactions_upserted: chunk.transactions.len(),
            logs_upserted: chunk.logs.len(),
            newly_finalized,
            truncated: chunk.truncated,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
