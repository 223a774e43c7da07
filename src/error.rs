//! Error types for the dashboard client.
//!
//! Every failure a caller can observe is an [`ApiError`], which has exactly
//! two kinds:
//!
//! | Variant | Meaning | Retried by the retry engine |
//! |---------|---------|-----------------------------|
//! | [`ApiError::Network`] | No well-formed response: connection failure, malformed JSON, unexpected content type | yes |
//! | [`ApiError::Http`] | A response with a non-2xx status | no |
//!
//! Input rejected before any request is sent is an [`ApiError::Validation`];
//! it is never retried.
//!
//! A `401` HTTP error is escalated by the API client into a token refresh;
//! all other statuses reach the caller unchanged.
//!
//! `ApiError` is `Clone` so a single refresh failure can be handed to every
//! request waiting on that refresh.
//!
//! Session persistence has its own [`StorageError`]; it never leaks into
//! request results.

use serde_json::Value;
use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the API client and the session store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Transport-level failure: the request never produced a usable response.
    #[error("Network Error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("API Error: {status} {status_text}")]
    Http {
        /// Numeric status code
        status: u16,
        /// Canonical reason phrase for the status
        status_text: String,
        /// Parsed error body (JSON when the server sent JSON, else a string)
        body: Value,
    },

    /// Input rejected locally; the message is meant for the end user.
    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// Build a transport error from anything printable.
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network(message.into())
    }

    /// Whether the retry engine may try this request again.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// Whether this is a `401 Unauthorized` response.
    #[inline]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Status code of an HTTP error, `None` for transport errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server-provided error body, if any.
    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiError::Http { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for ApiError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        ApiError::Network(format!("invalid header value: {}", err))
    }
}

impl From<reqwest::header::InvalidHeaderName> for ApiError {
    fn from(err: reqwest::header::InvalidHeaderName) -> Self {
        ApiError::Network(format!("invalid header name: {}", err))
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::Network(format!("invalid URL: {}", err))
    }
}

/// Errors from a [`SessionStorage`](crate::session::SessionStorage) backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Reading or writing the backing medium failed
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session could not be encoded
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
