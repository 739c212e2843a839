//! Index cursor — the durable singleton checkpoint.
//!
//! A single logical row records how far the chain has been indexed. It is
//! read at the start of every run and written exactly once at the end:
//! either advanced on success or stamped with `status = error` on abort.
//! `last_block_number` never moves independently of `last_run_at`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run status recorded on the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorStatus {
    Active,
    Error,
}

impl CursorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "error" => Self::Error,
            _ => Self::Active,
        }
    }
}

/// The indexer's durable position in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCursor {
    /// Last fully indexed block number. Monotonically non-decreasing
    /// across successful runs.
    pub last_block_number: u64,
    /// When the cursor was last written.
    pub last_run_at: DateTime<Utc>,
    /// Outcome of the most recent run.
    pub status: CursorStatus,
    /// Failure message from the most recent errored run.
    pub error_message: Option<String>,
    /// Consecutive errored runs since the last success.
    pub retry_count: u32,
}

impl IndexCursor {
    /// A fresh cursor positioned at `start_block`, as created on first
    /// deployment.
    pub fn starting_at(start_block: u64, now: DateTime<Utc>) -> Self {
        Self {
            last_block_number: start_block,
            last_run_at: now,
            status: CursorStatus::Active,
            error_message: None,
            retry_count: 0,
        }
    }

    /// The cursor after a successful run that completed through `block`.
    ///
    /// Clears any previous error state. `block` below the current position
    /// is clamped so the cursor never moves backwards.
    pub fn advanced(&self, block: u64, now: DateTime<Utc>) -> Self {
        Self {
            last_block_number: block.max(self.last_block_number),
            last_run_at: now,
            status: CursorStatus::Active,
            error_message: None,
            retry_count: 0,
        }
    }

    /// The cursor after a failed run: position unchanged, error recorded,
    /// retry count bumped.
    pub fn errored(&self, message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            last_block_number: self.last_block_number,
            last_run_at: now,
            status: CursorStatus::Error,
            error_message: Some(message.into()),
            retry_count: self.retry_count + 1,
        }
    }
}
