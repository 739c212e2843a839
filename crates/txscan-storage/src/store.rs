//! SQLite store: schema, batched upserts, cursor + lease, finality marker.
//!
//! Upsert-by-primary-key is the idempotence mechanism: re-running an
//! already-processed chunk (e.g. after a crash before the cursor advanced)
//! rewrites identical rows instead of duplicating them.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, SqlitePool};
use tracing::debug;

use txscan_core::cursor::{CursorStatus, IndexCursor};
use txscan_core::error::IndexError;
use txscan_core::types::{BlockRecord, LogRecord, TransactionRecord, TxStatus};

/// Rows per batched upsert statement, sized for SQLite bind limits.
const BATCH_ROWS: usize = 500;

/// SQLite-backed store for blocks, transactions, logs, the index cursor,
/// and the aggregate rollups. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: SqlitePool,
}

fn storage_err(e: impl std::fmt::Display) -> IndexError {
    IndexError::Storage(e.to_string())
}

impl Store {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./txscan.db"`) or a full SQLite
    /// URL (`"sqlite:./txscan.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, IndexError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory database. All data is lost when the pool drops;
    /// ideal for tests.
    pub async fn in_memory() -> Result<Self, IndexError> {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), IndexError> {
        // WAL mode lets the read path run alongside the writer.
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        let statements = [
            "CREATE TABLE IF NOT EXISTS blocks (
                number           INTEGER PRIMARY KEY,
                hash             TEXT    NOT NULL,
                parent_hash      TEXT    NOT NULL,
                timestamp        INTEGER NOT NULL,
                gas_used         INTEGER NOT NULL,
                gas_limit        INTEGER NOT NULL,
                miner            TEXT    NOT NULL,
                base_fee_per_gas INTEGER
            );",
            "CREATE TABLE IF NOT EXISTS transactions (
                hash                TEXT PRIMARY KEY,
                block_number        INTEGER NOT NULL,
                tx_index            INTEGER NOT NULL,
                from_addr           TEXT    NOT NULL,
                to_addr             TEXT,
                value               TEXT    NOT NULL,
                gas_used            INTEGER NOT NULL,
                gas_price           INTEGER NOT NULL,
                effective_gas_price INTEGER NOT NULL,
                gas_cost_gwei       INTEGER NOT NULL,
                method              TEXT    NOT NULL,
                status              TEXT    NOT NULL,
                finalized           INTEGER NOT NULL DEFAULT 0
            );",
            "CREATE INDEX IF NOT EXISTS idx_txs_block
                ON transactions (block_number DESC, tx_index DESC);",
            "CREATE INDEX IF NOT EXISTS idx_txs_from ON transactions (from_addr);",
            "CREATE TABLE IF NOT EXISTS logs (
                tx_hash      TEXT    NOT NULL,
                log_index    INTEGER NOT NULL,
                block_number INTEGER NOT NULL,
                address      TEXT    NOT NULL,
                topics       TEXT    NOT NULL,
                data         TEXT    NOT NULL,
                removed      INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (tx_hash, log_index)
            );",
            "CREATE INDEX IF NOT EXISTS idx_logs_block ON logs (block_number);",
            "CREATE TABLE IF NOT EXISTS index_cursor (
                id                INTEGER PRIMARY KEY CHECK (id = 1),
                last_block_number INTEGER NOT NULL,
                last_run_at       INTEGER NOT NULL,
                status            TEXT    NOT NULL,
                error_message     TEXT,
                retry_count       INTEGER NOT NULL DEFAULT 0,
                locked_until      INTEGER
            );",
            "CREATE TABLE IF NOT EXISTS agg_summary (
                wallet              TEXT PRIMARY KEY,
                total_transactions  INTEGER NOT NULL,
                total_gas_used      INTEGER NOT NULL,
                total_gas_cost_gwei INTEGER NOT NULL,
                avg_gas_per_tx      REAL    NOT NULL,
                latest_block        INTEGER NOT NULL,
                txs_24h             INTEGER NOT NULL,
                txs_7d              INTEGER NOT NULL,
                refreshed_at        INTEGER NOT NULL
            );",
            "CREATE TABLE IF NOT EXISTS agg_timeseries (
                wallet        TEXT    NOT NULL,
                bucket_start  INTEGER NOT NULL,
                tx_count      INTEGER NOT NULL,
                gas_used      INTEGER NOT NULL,
                gas_cost_gwei INTEGER NOT NULL,
                PRIMARY KEY (wallet, bucket_start)
            );",
        ];
        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    // ─── Cursor store ────────────────────────────────────────────────────────

    /// Load the singleton cursor row, if one exists.
    pub async fn load_cursor(&self) -> Result<Option<IndexCursor>, IndexError> {
        let row = sqlx::query(
            "SELECT last_block_number, last_run_at, status, error_message, retry_count
             FROM index_cursor WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| IndexCursor {
            last_block_number: r.get::<i64, _>("last_block_number") as u64,
            last_run_at: DateTime::from_timestamp(r.get::<i64, _>("last_run_at"), 0)
                .unwrap_or_else(Utc::now),
            status: CursorStatus::parse(r.get::<String, _>("status").as_str()),
            error_message: r.get("error_message"),
            retry_count: r.get::<i64, _>("retry_count") as u32,
        }))
    }

    /// Upsert the singleton cursor row. The lease column is managed
    /// separately and not touched here.
    pub async fn save_cursor(&self, cursor: &IndexCursor) -> Result<(), IndexError> {
        sqlx::query(
            "INSERT INTO index_cursor
                (id, last_block_number, last_run_at, status, error_message, retry_count)
             VALUES (1, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                last_block_number = excluded.last_block_number,
                last_run_at       = excluded.last_run_at,
                status            = excluded.status,
                error_message     = excluded.error_message,
                retry_count       = excluded.retry_count",
        )
        .bind(cursor.last_block_number as i64)
        .bind(cursor.last_run_at.timestamp())
        .bind(cursor.status.as_str())
        .bind(&cursor.error_message)
        .bind(cursor.retry_count as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(
            block = cursor.last_block_number,
            status = cursor.status.as_str(),
            "cursor saved"
        );
        Ok(())
    }

    // ─── Run lease ───────────────────────────────────────────────────────────

    /// Try to acquire the run lease on the cursor row.
    ///
    /// Succeeds iff no lease is held or the held lease has expired. When no
    /// cursor row exists yet (first deployment) the row is created at
    /// `start_block` with the lease already taken. Returns `false` if
    /// another invocation holds a live lease.
    pub async fn try_lock_cursor(
        &self,
        start_block: u64,
        now: DateTime<Utc>,
        ttl_secs: i64,
    ) -> Result<bool, IndexError> {
        let until = now.timestamp() + ttl_secs;
        let result = sqlx::query(
            "INSERT INTO index_cursor
                (id, last_block_number, last_run_at, status, retry_count, locked_until)
             VALUES (1, ?, ?, 'active', 0, ?)
             ON CONFLICT(id) DO UPDATE SET locked_until = excluded.locked_until
             WHERE index_cursor.locked_until IS NULL OR index_cursor.locked_until < ?",
        )
        .bind(start_block as i64)
        .bind(now.timestamp())
        .bind(until)
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(result.rows_affected() == 1)
    }

    /// Expiry of the currently held lease, if any.
    pub async fn lease_expiry(&self) -> Result<Option<DateTime<Utc>>, IndexError> {
        let row = sqlx::query("SELECT locked_until FROM index_cursor WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row
            .and_then(|r| r.get::<Option<i64>, _>("locked_until"))
            .and_then(|ts| DateTime::from_timestamp(ts, 0)))
    }

    /// Release the run lease.
    pub async fn unlock_cursor(&self) -> Result<(), IndexError> {
        sqlx::query("UPDATE index_cursor SET locked_until = NULL WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // ─── Batched upserts ─────────────────────────────────────────────────────

    /// Upsert block rows, keyed by number. Overwrites are expected inside
    /// the reorg overlap window.
    pub async fn upsert_blocks(&self, blocks: &[BlockRecord]) -> Result<(), IndexError> {
        for chunk in blocks.chunks(BATCH_ROWS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO blocks
                    (number, hash, parent_hash, timestamp, gas_used, gas_limit, miner, base_fee_per_gas) ",
            );
            qb.push_values(chunk, |mut b, blk| {
                b.push_bind(blk.number as i64)
                    .push_bind(&blk.hash)
                    .push_bind(&blk.parent_hash)
                    .push_bind(blk.timestamp)
                    .push_bind(blk.gas_used as i64)
                    .push_bind(blk.gas_limit as i64)
                    .push_bind(&blk.miner)
                    .push_bind(blk.base_fee_per_gas.map(|v| v as i64));
            });
            qb.push(
                " ON CONFLICT(number) DO UPDATE SET
                    hash = excluded.hash,
                    parent_hash = excluded.parent_hash,
                    timestamp = excluded.timestamp,
                    gas_used = excluded.gas_used,
                    gas_limit = excluded.gas_limit,
                    miner = excluded.miner,
                    base_fee_per_gas = excluded.base_fee_per_gas",
            );
            qb.build().execute(&self.pool).await.map_err(storage_err)?;
        }
        Ok(())
    }

    /// Upsert transaction rows, keyed by hash.
    ///
    /// An already-set `finalized` flag survives the overwrite: re-scanning
    /// the overlap window must never regress finality.
    pub async fn upsert_transactions(
        &self,
        txs: &[TransactionRecord],
    ) -> Result<(), IndexError> {
        for chunk in txs.chunks(BATCH_ROWS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO transactions
                    (hash, block_number, tx_index, from_addr, to_addr, value,
                     gas_used, gas_price, effective_gas_price, gas_cost_gwei,
                     method, status, finalized) ",
            );
            qb.push_values(chunk, |mut b, tx| {
                b.push_bind(&tx.hash)
                    .push_bind(tx.block_number as i64)
                    .push_bind(tx.tx_index as i64)
                    .push_bind(&tx.from)
                    .push_bind(&tx.to)
                    .push_bind(&tx.value)
                    .push_bind(tx.gas_used as i64)
                    .push_bind(tx.gas_price as i64)
                    .push_bind(tx.effective_gas_price as i64)
                    .push_bind(tx.gas_cost_gwei() as i64)
                    .push_bind(&tx.method)
                    .push_bind(tx.status.as_str())
                    .push_bind(tx.finalized as i64);
            });
            qb.push(
                " ON CONFLICT(hash) DO UPDATE SET
                    block_number = excluded.block_number,
                    tx_index = excluded.tx_index,
                    from_addr = excluded.from_addr,
                    to_addr = excluded.to_addr,
                    value = excluded.value,
                    gas_used = excluded.gas_used,
                    gas_price = excluded.gas_price,
                    effective_gas_price = excluded.effective_gas_price,
                    gas_cost_gwei = excluded.gas_cost_gwei,
                    method = excluded.method,
                    status = excluded.status,
                    finalized = MAX(transactions.finalized, excluded.finalized)",
            );
            qb.build().execute(&self.pool).await.map_err(storage_err)?;
        }
        Ok(())
    }

    /// Upsert log rows, keyed by `(tx_hash, log_index)`.
    pub async fn upsert_logs(&self, logs: &[LogRecord]) -> Result<(), IndexError> {
        for chunk in logs.chunks(BATCH_ROWS) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO logs
                    (tx_hash, log_index, block_number, address, topics, data, removed) ",
            );
            qb.push_values(chunk, |mut b, log| {
                let topics =
                    serde_json::to_string(&log.topics).unwrap_or_else(|_| "[]".into());
                b.push_bind(&log.tx_hash)
                    .push_bind(log.log_index as i64)
                    .push_bind(log.block_number as i64)
                    .push_bind(&log.address)
                    .push_bind(topics)
                    .push_bind(&log.data)
                    .push_bind(log.removed as i64);
            });
            qb.push(
                " ON CONFLICT(tx_hash, log_index) DO UPDATE SET
                    block_number = excluded.block_number,
                    address = excluded.address,
                    topics = excluded.topics,
                    data = excluded.data,
                    removed = excluded.removed",
            );
            qb.build().execute(&self.pool).await.map_err(storage_err)?;
        }
        Ok(())
    }

    // ─── Finality marker ─────────────────────────────────────────────────────

    /// Flag every unfinalized transaction at or below `cutoff` as finalized.
    /// Returns the number of rows flipped. Never un-flags.
    pub async fn mark_finalized(&self, cutoff: u64) -> Result<u64, IndexError> {
        let result = sqlx::query(
            "UPDATE transactions SET finalized = 1
             WHERE block_number <= ? AND finalized = 0",
        )
        .bind(cutoff as i64)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        let flipped = result.rows_affected();
        if flipped > 0 {
            debug!(cutoff, flipped, "finality marker advanced");
        }
        Ok(flipped)
    }

    // ─── Counts (used by tests and the trigger report) ───────────────────────

    pub async fn transaction_count(&self) -> Result<u64, IndexError> {
        self.count("transactions").await
    }

    pub async fn block_count(&self) -> Result<u64, IndexError> {
        self.count("blocks").await
    }

    pub async fn log_count(&self) -> Result<u64, IndexError> {
        self.count("logs").await
    }

    async fn count(&self, table: &str) -> Result<u64, IndexError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    /// Fetch one transaction row by hash (test/introspection helper).
    pub async fn get_transaction(
        &self,
        hash: &str,
    ) -> Result<Option<TransactionRecord>, IndexError> {
        let row = sqlx::query(
            "SELECT hash, block_number, tx_index, from_addr, to_addr, value,
                    gas_used, gas_price, effective_gas_price, method, status, finalized
             FROM transactions WHERE hash = ?",
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row.map(|r| tx_from_row(&r)))
    }
}

pub(crate) fn tx_from_row(r: &sqlx::sqlite::SqliteRow) -> TransactionRecord {
    TransactionRecord {
        hash: r.get("hash"),
        block_number: r.get::<i64, _>("block_number") as u64,
        tx_index: r.get::<i64, _>("tx_index") as u32,
        from: r.get("from_addr"),
        to: r.get("to_addr"),
        value: r.get("value"),
        gas_used: r.get::<i64, _>("gas_used") as u64,
        gas_price: r.get::<i64, _>("gas_price") as u64,
        effective_gas_price: r.get::<i64, _>("effective_gas_price") as u64,
        method: r.get("method"),
        status: TxStatus::parse(r.get::<String, _>("status").as_str()),
        finalized: r.get::<i64, _>("finalized") != 0,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
