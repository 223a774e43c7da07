//! Request construction.
//!
//! [`RequestOptions`] is what callers hand to [`ApiClient::request`](crate::ApiClient::request):
//! method, body, header overrides and the client-only flags. The API client
//! turns it into a [`PreparedRequest`] once the effective bearer token and
//! full URL are known; the retry engine replays that prepared request for
//! every attempt.
//!
//! # Header precedence
//!
//! 1. `Content-Type: application/json` and `Accept: application/json`
//! 2. caller overrides (replace defaults of the same name)
//! 3. `Authorization: Bearer <token>` when a token is resolved
//!
//! # Examples
//!
//! ```
//! use dashboard_client::client::RequestOptions;
//! use reqwest::Method;
//!
//! let options = RequestOptions::new()
//!     .with_method(Method::PUT)
//!     .with_json(&serde_json::json!({"name": "Ada"}))
//!     .unwrap()
//!     .with_header("X-Request-Id", "abc")
//!     .skip_retry();
//!
//! assert!(options.skip_retry);
//! assert!(!options.skip_auth);
//! ```

use crate::error::Result;
use crate::protocol::{bearer, constants::APPLICATION_JSON};
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Per-call request description.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// HTTP method (defaults to `GET`)
    pub method: Method,

    /// Encoded request body
    pub body: Option<Bytes>,

    /// Header overrides, applied over the JSON defaults
    pub headers: BTreeMap<String, String>,

    /// Bearer token to use instead of the session's access token
    pub token: Option<String>,

    /// Do not escalate a `401` into a token refresh
    pub skip_auth: bool,

    /// Make a single attempt, without transport-error retries
    pub skip_retry: bool,

    /// Abort signal; once fired no further attempts are made
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    /// `GET` with no body and no flags.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// JSON-encode `value` as the body.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(value)?));
        Ok(self)
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Use an explicit bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Disable 401 refresh-and-retry.
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Disable transport retries.
    pub fn skip_retry(mut self) -> Self {
        self.skip_retry = true;
        self
    }

    /// Attach an abort signal.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Whether the abort signal has fired.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// A fully resolved request, ready to be sent any number of times.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL
    pub url: String,
    /// Final header set
    pub headers: HeaderMap,
    /// Encoded body
    pub body: Option<Bytes>,
}

impl PreparedRequest {
    /// Resolve `options` against a URL and bearer token.
    pub fn new(url: impl Into<String>, options: &RequestOptions, token: Option<&str>) -> Result<Self> {
        Ok(Self {
            method: options.method.clone(),
            url: url.into(),
            headers: build_headers(&options.headers, token)?,
            body: options.body.clone(),
        })
    }

    /// Same request, re-authorized with another bearer token.
    pub fn with_token(&self, token: &str) -> Result<Self> {
        let mut request = self.clone();
        request
            .headers
            .insert(AUTHORIZATION, HeaderValue::from_str(&bearer(token))?);
        Ok(request)
    }

    /// Bearer token currently attached, if any.
    pub fn token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(crate::protocol::parse_bearer)
    }

    /// Create a `reqwest` builder for one attempt.
    pub(crate) fn to_builder(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        builder
    }
}

/// Compose the outgoing header set.
pub fn build_headers(overrides: &BTreeMap<String, String>, token: Option<&str>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

    for (name, value) in overrides {
        headers.insert(
            HeaderName::from_bytes(name.as_bytes())?,
            HeaderValue::from_str(value)?,
        );
    }

    if let Some(token) = token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&bearer(token))?);
    }

    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers() {
        let headers = build_headers(&BTreeMap::new(), None).unwrap();
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[ACCEPT], "application/json");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_token_wins_over_authorization_override() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Authorization".to_string(), "Bearer stale".to_string());
        overrides.insert("Accept".to_string(), "text/csv".to_string());

        let headers = build_headers(&overrides, Some("T1")).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer T1");
        assert_eq!(headers[ACCEPT], "text/csv");
    }

    #[test]
    fn test_invalid_header_is_a_transport_error() {
        let mut overrides = BTreeMap::new();
        overrides.insert("bad header".to_string(), "x".to_string());
        let err = build_headers(&overrides, None).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_prepared_request_retoken() {
        let options = RequestOptions::new().with_method(Method::POST).with_body("{}");
        let request = PreparedRequest::new("http://h/api/v1/x", &options, Some("T1")).unwrap();
        assert_eq!(request.token(), Some("T1"));

        let retried = request.with_token("T2").unwrap();
        assert_eq!(retried.token(), Some("T2"));
        assert_eq!(retried.method, Method::POST);
        assert_eq!(retried.body.as_deref(), Some(&b"{}"[..]));
    }

    #[test]
    fn test_cancellation_flag() {
        let cancel = CancellationToken::new();
        let options = RequestOptions::new().with_cancellation(cancel.clone());
        assert!(!options.is_cancelled());
        cancel.cancel();
        assert!(options.is_cancelled());
    }
}
