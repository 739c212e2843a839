//! HTTP error mapping.
//!
//! Every failure leaves the service as a JSON body `{"error": "..."}` with
//! a status that tells the caller whether to fix the request, back off, or
//! page someone.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use txscan_core::error::IndexError;

/// API-surface errors with their HTTP status.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed query parameter.
    BadRequest(String),
    /// Missing or wrong credential.
    Forbidden(String),
    /// A run is already in progress (lease held).
    Conflict(String),
    /// Upstream RPC failure.
    Upstream(String),
    /// Storage or other internal failure.
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::BadRequest(m)
            | Self::Forbidden(m)
            | Self::Conflict(m)
            | Self::Upstream(m)
            | Self::Internal(m) => m,
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::LeaseHeld { .. } => Self::Conflict(e.to_string()),
            IndexError::Rpc(_) => Self::Upstream(e.to_string()),
            IndexError::Storage(_) | IndexError::Config(_) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = self.message(), "request failed");
        }
        (status, Json(json!({ "error": self.message() }))).into_response()
    }
}
