//! txscan-core — canonical rows, checkpoint cursor, and window arithmetic
//! for the incremental transaction indexer.
//!
//! # Architecture
//!
//! ```text
//! Indexer::run_once
//!     ├── ScanWindow        (overlap-adjusted bounded block range)
//!     ├── ChainReader       (txscan-rpc: retrying JSON-RPC helpers)
//!     ├── Store             (txscan-storage: upserts, cursor, rollups)
//!     └── IndexCursor       (singleton checkpoint, lease-guarded)
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod scanner;
pub mod types;

pub use config::IndexerConfig;
pub use cursor::{CursorStatus, IndexCursor};
pub use error::IndexError;
pub use scanner::{next_window, ScanWindow};
pub use types::{BlockRecord, CallClassification, LogRecord, TransactionRecord, TxStatus};
