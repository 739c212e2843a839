//! Error taxonomy for the indexing pipeline.
//!
//! RPC and decode failures are handled locally (retry or degrade to a
//! fallback label); only storage and configuration errors surface as run
//! failures.

use thiserror::Error;

/// Errors that can abort an index run.
#[derive(Debug, Error)]
pub enum IndexError {
    /// RPC call failed after exhausting retries.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Persistence failure — the run aborts without advancing the cursor.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid or missing configuration; fatal at startup.
    #[error("config error: {0}")]
    Config(String),

    /// Another invocation holds the run lease on the cursor row.
    #[error("run lease held until {locked_until}")]
    LeaseHeld { locked_until: String },
}

impl IndexError {
    /// Returns `true` if the next scheduled invocation should retry the
    /// same unadvanced range.
    pub fn is_retryable_run(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_) | Self::LeaseHeld { .. })
    }
}
