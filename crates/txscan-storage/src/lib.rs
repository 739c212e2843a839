//! txscan-storage — SQLite persistence for the indexer.
//!
//! One `Store` owns the pool and exposes three surfaces:
//! - write path: batched idempotent upserts, the cursor store + run lease,
//!   and the finality marker (`store` module);
//! - rollups: the aggregation refresher (`aggregates`);
//! - read path: summary/timeseries/paginated transaction queries
//!   (`queries`).

pub mod aggregates;
pub mod queries;
pub mod store;

pub use queries::{Granularity, SummaryRow, TimeseriesPoint, TxPageRequest};
pub use store::Store;
