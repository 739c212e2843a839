//! txscan-rpc — the chain reader: a retry/backoff wrapper over raw JSON-RPC
//! calls, plus typed helpers for the handful of methods the indexer needs.

pub mod client;
pub mod error;
pub mod retry;
pub mod types;
pub mod wire;

pub use client::{ChainClient, ChainClientConfig, ChainReader, RpcTransport};
pub use error::RpcError;
pub use retry::{RetryConfig, RetryPolicy};
pub use types::{parse_hex_u128, parse_hex_u64, RawBlock, RawLog, RawReceipt, RawTransaction};
pub use wire::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
