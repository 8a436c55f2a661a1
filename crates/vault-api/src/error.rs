//! Error types for the Vault client.

use http::StatusCode;
use thiserror::Error;

/// Errors raised by an [`HttpClient`](crate::HttpClient) backend.
#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("http backend error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Errors returned by [`VaultClient`](crate::VaultClient) operations.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("invalid vault address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error(transparent)]
    Http(#[from] HttpClientError),

    #[error("vault returned HTTP {status}: {}", .errors.join("; "))]
    Api {
        status: StatusCode,
        errors: Vec<String>,
    },

    #[error("failed to decode vault response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed vault response: {0}")]
    Malformed(String),
}
