//! Gateway error taxonomy.
//!
//! Every failure on the request path ends up as a [`GatewayError`], which
//! knows the HTTP status the frontend should see. Error responses carry no
//! body; the cause is logged instead.

use axum::{
    http::{StatusCode, Version},
    response::{IntoResponse, Response},
};
use std::time::Duration;
use thiserror::Error;

/// Failures that terminate a single exchange.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Frontend sent a transfer-encoding other than `chunked`.
    #[error("unsupported request transfer-encoding: {0}")]
    UnsupportedTransferEncoding(String),

    /// Frontend protocol version cannot be relayed.
    #[error("unsupported HTTP version: {0:?}")]
    UnsupportedVersion(Version),

    /// Backend answered chunked but the frontend cannot receive chunks.
    #[error("chunked response cannot be relayed to a {0:?} client")]
    ChunkedNotSupported(Version),

    /// Backend used a transfer-encoding we cannot forward.
    #[error("unsupported response transfer-encoding: {0}")]
    UnsupportedResponseEncoding(String),

    /// Connecting to or talking with the backend failed.
    #[error("backend transport failure: {0}")]
    Backend(String),

    /// Reading the backend response body failed before it was forwarded.
    #[error("backend body failure: {0}")]
    BackendBody(String),

    /// Backend did not answer within the breaker's call timeout.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// Circuit breaker for the mapping is open.
    #[error("circuit open for mapping '{0}'")]
    CircuitOpen(String),

    /// Out-of-band identity provider call failed at the transport level.
    #[error("identity provider call failed: {0}")]
    Identity(#[from] reqwest::Error),

    /// Outbound request could not be assembled.
    #[error("invalid backend request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
}

impl GatewayError {
    /// Status code presented to the frontend.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::UnsupportedTransferEncoding(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnsupportedVersion(_)
            | GatewayError::ChunkedNotSupported(_)
            | GatewayError::UnsupportedResponseEncoding(_) => StatusCode::NOT_IMPLEMENTED,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::CircuitOpen(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Backend(_)
            | GatewayError::BackendBody(_)
            | GatewayError::Identity(_)
            | GatewayError::InvalidRequest(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::warn!(status = %status, error = %self, "Request rejected");
        }
        status.into_response()
    }
}
