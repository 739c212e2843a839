//! Read-side queries: summary, timeseries, paginated transactions.
//!
//! All reads hit committed rows or the rollup tables, so this path runs
//! with unlimited concurrency alongside the writer.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row};
use std::collections::BTreeMap;

use txscan_core::error::IndexError;
use txscan_core::types::TransactionRecord;

use crate::store::{tx_from_row, Store};

fn storage_err(e: sqlx::Error) -> IndexError {
    IndexError::Storage(e.to_string())
}

// ─── Summary ─────────────────────────────────────────────────────────────────

/// Aggregate KPIs, global or wallet-scoped. Gas cost is denominated in gwei.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub total_transactions: u64,
    pub total_gas_used: u64,
    pub total_gas_cost_gwei: u64,
    pub avg_gas_per_tx: f64,
    pub latest_block: u64,
    pub txs_24h: u64,
    pub txs_7d: u64,
}

impl SummaryRow {
    fn zeroed() -> Self {
        Self {
            total_transactions: 0,
            total_gas_used: 0,
            total_gas_cost_gwei: 0,
            avg_gas_per_tx: 0.0,
            latest_block: 0,
            txs_24h: 0,
            txs_7d: 0,
        }
    }
}

// ─── Timeseries ──────────────────────────────────────────────────────────────

/// Bucket width for timeseries queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hour" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            _ => None,
        }
    }

    /// Inclusive start of the bucket containing `ts`. Weeks start on
    /// Monday; months are calendar months.
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let day = ts.date_naive();
        let start = match self {
            Self::Hour => day.and_hms_opt(ts.hour(), 0, 0),
            Self::Day => day.and_hms_opt(0, 0, 0),
            Self::Week => (day - Duration::days(day.weekday().num_days_from_monday() as i64))
                .and_hms_opt(0, 0, 0),
            Self::Month => day.with_day(1).and_then(|d| d.and_hms_opt(0, 0, 0)),
        };
        // and_hms_opt(…, 0, 0) cannot fail for these inputs
        Utc.from_utc_datetime(&start.unwrap_or_else(|| day.and_hms_opt(0, 0, 0).unwrap()))
    }
}

/// One timeseries bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub period: DateTime<Utc>,
    pub transaction_count: u64,
    pub gas_used: u64,
    pub gas_cost_gwei: u64,
}

// ─── Transaction listing ─────────────────────────────────────────────────────

/// Parameters for the paginated transaction listing.
#[derive(Debug, Clone, Default)]
pub struct TxPageRequest {
    /// Page size; clamped to `1..=500`, default 50.
    pub limit: Option<u32>,
    /// Offset pagination.
    pub offset: Option<u32>,
    /// Filter by sender wallet.
    pub wallet: Option<String>,
    /// Keyset cursor: return rows strictly after the `(block_number, hash)`
    /// row in listing order. Stable under concurrent writes, unlike offsets.
    pub after: Option<(u64, String)>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

impl Store {
    // ─── Summary ────────────────────────────────────────────────────────────

    /// The rollup summary row, global (`wallet = None`) or wallet-scoped.
    /// A wallet with no indexed activity gets a zeroed summary.
    pub async fn summary(&self, wallet: Option<&str>) -> Result<SummaryRow, IndexError> {
        let key = wallet.map(|w| w.to_ascii_lowercase()).unwrap_or_default();
        let row = sqlx::query(
            "SELECT total_transactions, total_gas_used, total_gas_cost_gwei,
                    avg_gas_per_tx, latest_block, txs_24h, txs_7d
             FROM agg_summary WHERE wallet = ?",
        )
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(row
            .map(|r| SummaryRow {
                total_transactions: r.get::<i64, _>("total_transactions") as u64,
                total_gas_used: r.get::<i64, _>("total_gas_used") as u64,
                total_gas_cost_gwei: r.get::<i64, _>("total_gas_cost_gwei") as u64,
                avg_gas_per_tx: r.get::<f64, _>("avg_gas_per_tx"),
                latest_block: r.get::<i64, _>("latest_block") as u64,
                txs_24h: r.get::<i64, _>("txs_24h") as u64,
                txs_7d: r.get::<i64, _>("txs_7d") as u64,
            })
            .unwrap_or_else(SummaryRow::zeroed))
    }

    // ─── Timeseries ─────────────────────────────────────────────────────────

    /// Bucketed counts and gas over an optional `[from, to)` range, ordered
    /// descending by period. Buckets are folded from the hourly rollup.
    pub async fn timeseries(
        &self,
        granularity: Granularity,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        wallet: Option<&str>,
    ) -> Result<Vec<TimeseriesPoint>, IndexError> {
        let key = wallet.map(|w| w.to_ascii_lowercase()).unwrap_or_default();

        let mut qb = QueryBuilder::new(
            "SELECT bucket_start, tx_count, gas_used, gas_cost_gwei
             FROM agg_timeseries WHERE wallet = ",
        );
        qb.push_bind(&key);
        if let Some(from) = from {
            qb.push(" AND bucket_start >= ").push_bind(from.timestamp());
        }
        if let Some(to) = to {
            qb.push(" AND bucket_start < ").push_bind(to.timestamp());
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        // Fold hourly rows into the requested bucket width.
        let mut buckets: BTreeMap<i64, TimeseriesPoint> = BTreeMap::new();
        for row in rows {
            let hour = DateTime::from_timestamp(row.get::<i64, _>("bucket_start"), 0)
                .unwrap_or_else(Utc::now);
            let period = granularity.bucket_start(hour);
            let entry = buckets
                .entry(period.timestamp())
                .or_insert_with(|| TimeseriesPoint {
                    period,
                    transaction_count: 0,
                    gas_used: 0,
                    gas_cost_gwei: 0,
                });
            entry.transaction_count += row.get::<i64, _>("tx_count") as u64;
            entry.gas_used += row.get::<i64, _>("gas_used") as u64;
            entry.gas_cost_gwei += row.get::<i64, _>("gas_cost_gwei") as u64;
        }

        Ok(buckets.into_values().rev().collect())
    }

    // ─── Transactions ───────────────────────────────────────────────────────

    /// Paginated transaction listing, ordered `(block_number DESC,
    /// tx_index DESC)`, with offset and keyset pagination.
    pub async fn list_transactions(
        &self,
        page: &TxPageRequest,
    ) -> Result<Vec<TransactionRecord>, IndexError> {
        let limit = page
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = page.offset.unwrap_or(0);

        let mut qb = QueryBuilder::new(
            "SELECT hash, block_number, tx_index, from_addr, to_addr, value,
                    gas_used, gas_price, effective_gas_price, method, status, finalized
             FROM transactions WHERE 1 = 1",
        );
        if let Some(wallet) = &page.wallet {
            qb.push(" AND from_addr = ")
                .push_bind(wallet.to_ascii_lowercase());
        }
        if let Some((block, hash)) = &page.after {
            // The resume filter must agree with the listing order, which
            // tie-breaks inside a block on tx_index. The cursor only carries
            // the hash, so the boundary row's tx_index is looked up here;
            // a vanished boundary row falls back to earlier blocks only.
            qb.push(" AND (block_number < ")
                .push_bind(*block as i64)
                .push(" OR (block_number = ")
                .push_bind(*block as i64)
                .push(" AND (tx_index < COALESCE((SELECT tx_index FROM transactions WHERE hash = ")
                .push_bind(hash)
                .push("), -1) OR (tx_index = (SELECT tx_index FROM transactions WHERE hash = ")
                .push_bind(hash)
                .push(") AND hash < ")
                .push_bind(hash)
                .push("))))");
        }
        qb.push(" ORDER BY block_number DESC, tx_index DESC, hash DESC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(rows.iter().map(tx_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use txscan_core::types::{BlockRecord, TransactionRecord, TxStatus};

    use super::*;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    fn tx(hash_seed: u64, block: u64, idx: u32, from: &str) -> TransactionRecord {
        TransactionRecord {
            hash: format!("0x{hash_seed:064x}"),
            block_number: block,
            tx_index: idx,
            from: from.into(),
            to: None,
            value: "0".into(),
            gas_used: 21_000,
            gas_price: 10_000_000_000,
            effective_gas_price: 10_000_000_000,
            method: "transfer".into(),
            status: TxStatus::Success,
            finalized: false,
        }
    }

    fn block(number: u64, ts: i64) -> BlockRecord {
        BlockRecord {
            number,
            hash: format!("0x{number:064x}"),
            parent_hash: format!("0x{:064x}", number - 1),
            timestamp: ts,
            gas_used: 0,
            gas_limit: 30_000_000,
            miner: "0x0".into(),
            base_fee_per_gas: None,
        }
    }

    #[test]
    fn bucket_starts() {
        // 2023-11-15 (Wednesday) 08:42:17 UTC
        let ts = Utc.with_ymd_and_hms(2023, 11, 15, 8, 42, 17).unwrap();
        assert_eq!(
            Granularity::Hour.bucket_start(ts),
            Utc.with_ymd_and_hms(2023, 11, 15, 8, 0, 0).unwrap()
        );
        assert_eq!(
            Granularity::Day.bucket_start(ts),
            Utc.with_ymd_and_hms(2023, 11, 15, 0, 0, 0).unwrap()
        );
        assert_eq!(
            Granularity::Week.bucket_start(ts),
            Utc.with_ymd_and_hms(2023, 11, 13, 0, 0, 0).unwrap() // Monday
        );
        assert_eq!(
            Granularity::Month.bucket_start(ts),
            Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn granularity_parse() {
        assert_eq!(Granularity::parse("hour"), Some(Granularity::Hour));
        assert_eq!(Granularity::parse("month"), Some(Granularity::Month));
        assert_eq!(Granularity::parse("fortnight"), None);
    }

    #[tokio::test]
    async fn listing_orders_and_paginates() {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_transactions(&[
                tx(1, 100, 0, ALICE),
                tx(2, 100, 5, BOB),
                tx(3, 101, 0, ALICE),
                tx(4, 102, 2, BOB),
            ])
            .await
            .unwrap();

        let page = store
            .list_transactions(&TxPageRequest {
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].block_number, 102);
        assert_eq!(page[1].block_number, 101);

        let next = store
            .list_transactions(&TxPageRequest {
                limit: Some(2),
                offset: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();
        // Within block 100, higher tx_index comes first.
        assert_eq!(next[0].tx_index, 5);
        assert_eq!(next[1].tx_index, 0);
    }

    #[tokio::test]
    async fn listing_filters_by_wallet() {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_transactions(&[tx(1, 100, 0, ALICE), tx(2, 101, 0, BOB)])
            .await
            .unwrap();

        let page = store
            .list_transactions(&TxPageRequest {
                wallet: Some(ALICE.into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].from, ALICE);
    }

    #[tokio::test]
    async fn keyset_cursor_excludes_boundary_row() {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_transactions(&[
                tx(0xa, 100, 0, ALICE),
                tx(0xb, 101, 0, ALICE),
                tx(0xc, 102, 0, ALICE),
            ])
            .await
            .unwrap();

        let boundary = format!("0x{:064x}", 0xb);
        let page = store
            .list_transactions(&TxPageRequest {
                after: Some((101, boundary)),
                ..Default::default()
            })
            .await
            .unwrap();
        // Only block 100 remains after the (101, 0xb) row in descending
        // listing order; the boundary row itself is excluded.
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].block_number, 100);
    }

    #[tokio::test]
    async fn keyset_cursor_resumes_in_listing_order_within_a_block() {
        let store = Store::in_memory().await.unwrap();
        // Hash order inverts the tx_index order inside the block: the row
        // listed first has the smaller hash.
        let first = tx(0x01, 100, 1, ALICE);
        let second = tx(0xff, 100, 0, ALICE);
        store
            .upsert_transactions(&[first.clone(), second.clone()])
            .await
            .unwrap();

        let page = store
            .list_transactions(&TxPageRequest {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page[0].hash, first.hash);

        // Resuming from the first row must surface the remaining one even
        // though its hash sorts above the boundary hash.
        let rest = store
            .list_transactions(&TxPageRequest {
                after: Some((page[0].block_number, page[0].hash.clone())),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].hash, second.hash);
    }

    #[tokio::test]
    async fn limit_is_clamped_to_hard_cap() {
        let store = Store::in_memory().await.unwrap();
        let txs: Vec<_> = (0..600u64).map(|i| tx(i, i, 0, ALICE)).collect();
        store.upsert_transactions(&txs).await.unwrap();

        let page = store
            .list_transactions(&TxPageRequest {
                limit: Some(9_999),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.len(), MAX_PAGE_SIZE as usize);
    }

    #[tokio::test]
    async fn timeseries_range_is_inclusive_from_exclusive_to() {
        let store = Store::in_memory().await.unwrap();
        let h0 = 1_700_000_000 / 3_600 * 3_600; // hour-aligned
        store
            .upsert_blocks(&[block(1, h0), block(2, h0 + 3_600), block(3, h0 + 7_200)])
            .await
            .unwrap();
        store
            .upsert_transactions(&[tx(1, 1, 0, ALICE), tx(2, 2, 0, ALICE), tx(3, 3, 0, ALICE)])
            .await
            .unwrap();
        store
            .refresh_aggregates(DateTime::from_timestamp(h0 + 8_000, 0).unwrap())
            .await
            .unwrap();

        let from = DateTime::from_timestamp(h0, 0).unwrap();
        let to = DateTime::from_timestamp(h0 + 7_200, 0).unwrap();
        let points = store
            .timeseries(Granularity::Hour, Some(from), Some(to), None)
            .await
            .unwrap();
        // [h0, h0+7200) covers the first two hourly buckets only.
        assert_eq!(points.len(), 2);
    }

    #[tokio::test]
    async fn wallet_keys_are_case_insensitive() {
        let store = Store::in_memory().await.unwrap();
        store
            .upsert_blocks(&[block(1, 1_700_000_000)])
            .await
            .unwrap();
        store
            .upsert_transactions(&[tx(1, 1, 0, ALICE)])
            .await
            .unwrap();
        store
            .refresh_aggregates(DateTime::from_timestamp(1_700_000_100, 0).unwrap())
            .await
            .unwrap();

        let mixed = ALICE.to_uppercase().replace("0X", "0x");
        let summary = store.summary(Some(&mixed)).await.unwrap();
        assert_eq!(summary.total_transactions, 1);
    }
}
