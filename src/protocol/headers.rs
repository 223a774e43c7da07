//! Header and URL formatting shared by the request builder and decoder.
//!
//! # Examples
//!
//! ```
//! use dashboard_client::protocol::{bearer, build_url, normalize_endpoint, parse_bearer};
//!
//! assert_eq!(normalize_endpoint("users"), "/users");
//! assert_eq!(normalize_endpoint("/users"), "/users");
//!
//! let url = build_url("http://localhost:4001", "/api/v1", "users/42");
//! assert_eq!(url, "http://localhost:4001/api/v1/users/42");
//!
//! assert_eq!(bearer("T1"), "Bearer T1");
//! assert_eq!(parse_bearer("Bearer T1"), Some("T1"));
//! ```

use super::constants::{APPLICATION_JSON, BEARER_PREFIX};

/// Give an endpoint exactly one leading slash.
pub fn normalize_endpoint(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_start_matches('/'))
}

/// Join origin, versioned prefix and endpoint into a full request URL.
///
/// Trailing slashes on the origin and prefix are dropped so the result never
/// contains `//` at a join point.
pub fn build_url(api_url: &str, api_prefix: &str, endpoint: &str) -> String {
    let origin = api_url.trim_end_matches('/');
    let prefix = api_prefix.trim_end_matches('/');
    let prefix = if prefix.is_empty() {
        String::new()
    } else {
        normalize_endpoint(prefix)
    };
    format!("{}{}{}", origin, prefix, normalize_endpoint(endpoint))
}

/// Format an `Authorization` header value for a bearer token.
#[inline]
pub fn bearer(token: &str) -> String {
    format!("{}{}", BEARER_PREFIX, token)
}

/// Extract the token from a `Bearer <token>` header value.
pub fn parse_bearer(value: &str) -> Option<&str> {
    value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Whether a `Content-Type` value denotes JSON (parameters such as
/// `charset` are allowed).
pub fn is_json_content_type(value: &str) -> bool {
    value.to_ascii_lowercase().contains(APPLICATION_JSON)
}
