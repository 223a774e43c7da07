//! Wire-level constants and helpers for the dashboard backend API.
//!
//! # Endpoints
//!
//! | Path | Purpose |
//! |------|---------|
//! | `POST /auth/login` | Exchange credentials for a token pair |
//! | `POST /auth/refresh-token` | Exchange a refresh token for a new pair |
//! | `POST /auth/logout` | Revoke the refresh token (optionally on all devices) |
//!
//! All paths live under [`API_PREFIX`].

mod headers;

pub use headers::{
    bearer, build_url, is_json_content_type, normalize_endpoint, parse_bearer,
};

/// Versioned path prefix shared by every endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Storage key the session is persisted under by default.
pub const DEFAULT_STORAGE_KEY: &str = "auth-storage";

/// Version tag written into the persisted session envelope.
pub const STORAGE_VERSION: u32 = 0;

/// Endpoint paths (relative to [`API_PREFIX`]).
pub mod endpoints {
    /// Credential login
    pub const LOGIN: &str = "/auth/login";
    /// Token refresh
    pub const REFRESH_TOKEN: &str = "/auth/refresh-token";
    /// Logout and token revocation
    pub const LOGOUT: &str = "/auth/logout";
}

/// Header names and values the client always sends.
pub mod constants {
    /// JSON media type used for both `Content-Type` and `Accept`
    pub const APPLICATION_JSON: &str = "application/json";
    /// Authorization scheme prefix
    pub const BEARER_PREFIX: &str = "Bearer ";
}
