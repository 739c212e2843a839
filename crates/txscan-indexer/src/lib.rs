//! txscan-indexer — turns one scheduler fire into one bounded unit of work.
//!
//! # Pipeline
//!
//! ```text
//! run_once
//!   ├── lease on the cursor row          (skip if another run is live)
//!   ├── next_window                      (chunked, overlap-adjusted)
//!   ├── fetch_window                     (logs → txs/receipts/blocks,
//!   │                                     bounded-concurrency, capped)
//!   ├── upsert blocks / txs / logs       (batched, idempotent)
//!   ├── mark_finalized                   (head − finality_depth)
//!   ├── refresh_aggregates               (summary + hourly rollups)
//!   └── advance cursor                   (only after writes committed)
//! ```

pub mod classify;
pub mod fetch;
pub mod run;

#[cfg(test)]
mod testutil;

pub use classify::MethodClassifier;
pub use fetch::FetchedChunk;
pub use run::{Indexer, RunReport};
