//! Retrying JSON-RPC chain client.
//!
//! Two seams: `ChainReader` is what the indexer mocks in its tests, and
//! `RpcTransport` is the wire under `ChainClient`, so the retry loop itself
//! is testable without a live endpoint. Transient failures (HTTP 5xx, 429,
//! transport errors) are retried with exponential backoff up to the
//! configured bound; everything else propagates immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::RpcError;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::{parse_hex_u64, RawBlock, RawLog, RawReceipt, RawTransaction};
use crate::wire::{JsonRpcRequest, JsonRpcResponse};

/// Typed read access to the chain, as needed by the indexer.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64, RpcError>;
    async fn get_block(&self, number: u64) -> Result<Option<RawBlock>, RpcError>;
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[String],
    ) -> Result<Vec<RawLog>, RpcError>;
    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, RpcError>;
    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<RawReceipt>, RpcError>;
}

/// One request/response exchange with a JSON-RPC endpoint, no retries.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(&self, req: &JsonRpcRequest) -> Result<Value, RpcError>;
}

/// Configuration for `ChainClient`.
#[derive(Debug, Clone)]
pub struct ChainClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for ChainClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// reqwest-backed transport.
struct HttpTransport {
    url: String,
    http: reqwest::Client,
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(&self, req: &JsonRpcRequest) -> Result<Value, RpcError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(RpcError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RpcError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| RpcError::Http(e.to_string()))?;
        envelope.into_result().map_err(RpcError::Rpc)
    }
}

/// JSON-RPC client with retry/backoff over a pluggable transport.
pub struct ChainClient {
    transport: Arc<dyn RpcTransport>,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl ChainClient {
    pub fn new(url: impl Into<String>, config: ChainClientConfig) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RpcError::Http(e.to_string()))?;

        Ok(Self::with_transport(
            Arc::new(HttpTransport {
                url: url.into(),
                http,
            }),
            config.retry,
        ))
    }

    pub fn default_for(url: impl Into<String>) -> Result<Self, RpcError> {
        Self::new(url, ChainClientConfig::default())
    }

    /// Client over an arbitrary transport; the seam the retry tests use.
    pub fn with_transport(transport: Arc<dyn RpcTransport>, retry: RetryConfig) -> Self {
        Self {
            transport,
            retry: RetryPolicy::new(retry),
            next_id: AtomicU64::new(1),
        }
    }

    /// Issue `method(params)`, retrying transient failures with backoff.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.transport.send(&req).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            method = %req.method,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying rpc call"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(method = %req.method, attempt, error = %e, "rpc retries exhausted");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn decode_optional<T: serde::de::DeserializeOwned>(value: Value) -> Result<Option<T>, RpcError> {
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }
}

#[async_trait]
impl ChainReader for ChainClient {
    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        let value = self.call("eth_blockNumber", vec![]).await?;
        Ok(parse_hex_u64(value.as_str().unwrap_or("0x0")))
    }

    async fn get_block(&self, number: u64) -> Result<Option<RawBlock>, RpcError> {
        let value = self
            .call(
                "eth_getBlockByNumber",
                vec![json!(format!("0x{number:x}")), json!(false)],
            )
            .await?;
        Self::decode_optional(value)
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        addresses: &[String],
    ) -> Result<Vec<RawLog>, RpcError> {
        let filter = json!({
            "fromBlock": format!("0x{from:x}"),
            "toBlock": format!("0x{to:x}"),
            "address": addresses,
        });
        let value = self.call("eth_getLogs", vec![filter]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_transaction(&self, hash: &str) -> Result<Option<RawTransaction>, RpcError> {
        let value = self
            .call("eth_getTransactionByHash", vec![json!(hash)])
            .await?;
        Self::decode_optional(value)
    }

    async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<RawReceipt>, RpcError> {
        let value = self
            .call("eth_getTransactionReceipt", vec![json!(hash)])
            .await?;
        Self::decode_optional(value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    /// Fails the first `failures` sends with the scripted error, then
    /// succeeds. Counts every attempt.
    struct FlakyTransport {
        failures: u32,
        attempts: AtomicU32,
        error: fn() -> RpcError,
    }

    impl FlakyTransport {
        fn new(failures: u32, error: fn() -> RpcError) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                error,
            }
        }
    }

    #[async_trait]
    impl RpcTransport for FlakyTransport {
        async fn send(&self, _req: &JsonRpcRequest) -> Result<Value, RpcError> {
            let n = self.attempts.fetch_add(1, Ordering::Relaxed);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(json!("0x10"))
            }
        }
    }

    fn fast_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        }
    }

    fn client_over(transport: FlakyTransport, max_retries: u32) -> (ChainClient, Arc<FlakyTransport>) {
        let transport = Arc::new(transport);
        let client = ChainClient::with_transport(transport.clone(), fast_retry(max_retries));
        (client, transport)
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let (client, transport) =
            client_over(FlakyTransport::new(2, || RpcError::RateLimited), 3);

        let value = client.call("eth_blockNumber", vec![]).await.unwrap();
        assert_eq!(value, json!("0x10"));
        assert_eq!(transport.attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn consecutive_rate_limits_exhaust_retries() {
        let (client, transport) =
            client_over(FlakyTransport::new(u32::MAX, || RpcError::RateLimited), 2);

        let err = client.call("eth_getLogs", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::RateLimited));
        // First try plus max_retries further attempts, then give up.
        assert_eq!(transport.attempts.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let (client, transport) = client_over(
            FlakyTransport::new(1, || RpcError::Status {
                status: 503,
                body: "unavailable".into(),
            }),
            3,
        );

        assert!(client.call("eth_blockNumber", vec![]).await.is_ok());
        assert_eq!(transport.attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn permanent_errors_fail_without_retry() {
        let (client, transport) = client_over(
            FlakyTransport::new(u32::MAX, || RpcError::Status {
                status: 400,
                body: "bad request".into(),
            }),
            3,
        );

        let err = client.call("eth_blockNumber", vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::Status { status: 400, .. }));
        assert_eq!(transport.attempts.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn decode_optional_null_is_none() {
        let v: Option<RawLog> = ChainClient::decode_optional(Value::Null).unwrap();
        assert!(v.is_none());
    }

    #[test]
    fn decode_optional_malformed_is_error() {
        let r: Result<Option<RawReceipt>, _> = ChainClient::decode_optional(json!({"bogus": 1}));
        assert!(r.is_err());
    }

    #[test]
    fn client_builds_with_defaults() {
        assert!(ChainClient::default_for("http://localhost:8545").is_ok());
    }
}
