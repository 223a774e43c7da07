//! Response decoding.
//!
//! Turns a raw HTTP response into either a typed value or an [`ApiError`].
//! Only JSON success payloads are supported.
//!
//! | Status | Content-Type | Outcome |
//! |--------|--------------|---------|
//! | 2xx | JSON | body deserialized into `T`, or `Network("Invalid JSON response")` |
//! | 2xx | anything else | `Network("Unexpected response type")` |
//! | other | JSON | `Http` with the parsed JSON body |
//! | other | anything else | `Http` with the body as a string |

use crate::error::{ApiError, Result};
use crate::protocol::is_json_content_type;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Read a `reqwest` response to completion and decode it.
pub async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if !status.is_success() {
        // An unreadable error body degrades to the status text rather than
        // turning an HTTP error into a transport error.
        let body = response.bytes().await.unwrap_or_default();
        return Err(http_error(status, content_type.as_deref(), &body));
    }

    let body = response.bytes().await?;
    decode_success(content_type.as_deref(), &body)
}

/// Decode a successful response body.
pub fn decode_success<T: DeserializeOwned>(content_type: Option<&str>, body: &[u8]) -> Result<T> {
    match content_type {
        Some(ct) if is_json_content_type(ct) => serde_json::from_slice(body)
            .map_err(|_| ApiError::network("Invalid JSON response")),
        _ => Err(ApiError::network("Unexpected response type")),
    }
}

/// Build the HTTP error for a non-success response.
pub fn http_error(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> ApiError {
    let status_text = status.canonical_reason().unwrap_or_default().to_string();

    let parsed = match content_type {
        Some(ct) if is_json_content_type(ct) => serde_json::from_slice::<Value>(body).ok(),
        _ => std::str::from_utf8(body).ok().map(|s| Value::String(s.to_string())),
    };

    ApiError::Http {
        status: status.as_u16(),
        body: parsed.unwrap_or_else(|| Value::String(status_text.clone())),
        status_text,
    }
}
