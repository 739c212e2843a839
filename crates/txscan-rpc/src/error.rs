//! Chain reader error types.

use thiserror::Error;

use crate::wire::JsonRpcError;

/// Errors from a JSON-RPC call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport failure (connection refused, TLS, timeout at the socket).
    #[error("http error: {0}")]
    Http(String),

    /// Non-success HTTP status from the provider.
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },

    /// Rate limit exceeded (HTTP 429 or JSON-RPC -32005).
    #[error("rate limited")]
    RateLimited,

    /// Protocol-level error returned by the node.
    #[error("{0}")]
    Rpc(JsonRpcError),

    /// Response could not be deserialized into the expected shape.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl RpcError {
    /// Returns `true` if the error is transient and worth retrying:
    /// rate limits, 5xx statuses, and transport failures. Permanent 4xx and
    /// node execution errors propagate immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Rpc(err) => err.is_rate_limit(),
            Self::Deserialization(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_retryable_client_errors_not() {
        assert!(RpcError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!RpcError::Status {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(RpcError::RateLimited.is_retryable());
        assert!(RpcError::Http("connection reset".into()).is_retryable());
    }

    #[test]
    fn rpc_rate_limit_code_is_retryable() {
        let err = RpcError::Rpc(JsonRpcError {
            code: -32005,
            message: "limit exceeded".into(),
            data: None,
        });
        assert!(err.is_retryable());

        let err = RpcError::Rpc(JsonRpcError {
            code: -32602,
            message: "invalid params".into(),
            data: None,
        });
        assert!(!err.is_retryable());
    }
}
