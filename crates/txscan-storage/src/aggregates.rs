//! Aggregation refresher — rebuilds summary and timeseries rollups.
//!
//! Runs after every successful chunk, so rollup staleness is bounded by the
//! scheduler interval. The read path only ever touches these tables; it
//! never aggregates over the full `transactions` table.

use chrono::{DateTime, Utc};
use tracing::debug;

use txscan_core::error::IndexError;

use crate::store::Store;

const DAY_SECS: i64 = 86_400;
const HOUR_SECS: i64 = 3_600;

impl Store {
    /// Rebuild `agg_summary` (global row plus one row per sender wallet) and
    /// hourly `agg_timeseries` rollups from the persisted transactions, in a
    /// single SQL transaction.
    pub async fn refresh_aggregates(&self, now: DateTime<Utc>) -> Result<(), IndexError> {
        let err = |e: sqlx::Error| IndexError::Storage(e.to_string());

        let cutoff_24h = now.timestamp() - DAY_SECS;
        let cutoff_7d = now.timestamp() - 7 * DAY_SECS;
        let refreshed_at = now.timestamp();

        let mut dbtx = self.pool.begin().await.map_err(err)?;

        sqlx::query("DELETE FROM agg_summary")
            .execute(&mut *dbtx)
            .await
            .map_err(err)?;

        // Global summary, wallet = ''. The aggregate query yields exactly
        // one row even over an empty table. The block join is outer so a
        // transaction whose header never arrived still counts in the
        // totals; without a timestamp it just falls outside the recency
        // windows.
        sqlx::query(
            "INSERT INTO agg_summary
                (wallet, total_transactions, total_gas_used, total_gas_cost_gwei,
                 avg_gas_per_tx, latest_block, txs_24h, txs_7d, refreshed_at)
             SELECT '',
                    COUNT(*),
                    COALESCE(SUM(t.gas_used), 0),
                    COALESCE(SUM(t.gas_cost_gwei), 0),
                    COALESCE(AVG(t.gas_used), 0.0),
                    COALESCE(MAX(t.block_number), 0),
                    COALESCE(SUM(CASE WHEN b.timestamp >= ? THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN b.timestamp >= ? THEN 1 ELSE 0 END), 0),
                    ?
             FROM transactions t
             LEFT JOIN blocks b ON b.number = t.block_number",
        )
        .bind(cutoff_24h)
        .bind(cutoff_7d)
        .bind(refreshed_at)
        .execute(&mut *dbtx)
        .await
        .map_err(err)?;

        // Per-wallet summaries keyed by sender address.
        sqlx::query(
            "INSERT INTO agg_summary
                (wallet, total_transactions, total_gas_used, total_gas_cost_gwei,
                 avg_gas_per_tx, latest_block, txs_24h, txs_7d, refreshed_at)
             SELECT LOWER(t.from_addr),
                    COUNT(*),
                    SUM(t.gas_used),
                    SUM(t.gas_cost_gwei),
                    AVG(t.gas_used),
                    MAX(t.block_number),
                    SUM(CASE WHEN b.timestamp >= ? THEN 1 ELSE 0 END),
                    SUM(CASE WHEN b.timestamp >= ? THEN 1 ELSE 0 END),
                    ?
             FROM transactions t
             LEFT JOIN blocks b ON b.number = t.block_number
             GROUP BY LOWER(t.from_addr)",
        )
        .bind(cutoff_24h)
        .bind(cutoff_7d)
        .bind(refreshed_at)
        .execute(&mut *dbtx)
        .await
        .map_err(err)?;

        sqlx::query("DELETE FROM agg_timeseries")
            .execute(&mut *dbtx)
            .await
            .map_err(err)?;

        // Hourly buckets; coarser granularities fold these at query time.
        sqlx::query(
            "INSERT INTO agg_timeseries (wallet, bucket_start, tx_count, gas_used, gas_cost_gwei)
             SELECT '', (b.timestamp / ?) * ?, COUNT(*), SUM(t.gas_used), SUM(t.gas_cost_gwei)
             FROM transactions t
             JOIN blocks b ON b.number = t.block_number
             GROUP BY (b.timestamp / ?) * ?",
        )
        .bind(HOUR_SECS)
        .bind(HOUR_SECS)
        .bind(HOUR_SECS)
        .bind(HOUR_SECS)
        .execute(&mut *dbtx)
        .await
        .map_err(err)?;

        sqlx::query(
            "INSERT INTO agg_timeseries (wallet, bucket_start, tx_count, gas_used, gas_cost_gwei)
             SELECT LOWER(t.from_addr), (b.timestamp / ?) * ?, COUNT(*),
                    SUM(t.gas_used), SUM(t.gas_cost_gwei)
             FROM transactions t
             JOIN blocks b ON b.number = t.block_number
             GROUP BY LOWER(t.from_addr), (b.timestamp / ?) * ?",
        )
        .bind(HOUR_SECS)
        .bind(HOUR_SECS)
        .bind(HOUR_SECS)
        .bind(HOUR_SECS)
        .execute(&mut *dbtx)
        .await
        .map_err(err)?;

        dbtx.commit().await.map_err(err)?;
        debug!("aggregate rollups refreshed");
        Ok(())
    }
}
