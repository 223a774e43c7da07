//! Client configuration.
//!
//! [`ClientConfig`] controls where requests go, how transport failures are
//! retried and how the session is persisted. Defaults target a local
//! development backend.
//!
//! # Environment
//!
//! [`ClientConfig::from_env`] overlays these variables on the defaults:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DASHBOARD_API_URL` | `api_url` |
//! | `DASHBOARD_API_TIMEOUT` | `request_timeout_ms` |
//! | `DASHBOARD_API_RETRY_ATTEMPTS` | `max_attempts` |

use crate::protocol::{API_PREFIX, DEFAULT_STORAGE_KEY};
use std::time::Duration;

const ENV_API_URL: &str = "DASHBOARD_API_URL";
const ENV_API_TIMEOUT: &str = "DASHBOARD_API_TIMEOUT";
const ENV_API_RETRY_ATTEMPTS: &str = "DASHBOARD_API_RETRY_ATTEMPTS";

/// Configuration for [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Backend origin, e.g. `http://localhost:4001`
    pub api_url: String,

    /// Versioned path prefix placed between the origin and every endpoint
    pub api_prefix: String,

    /// Total attempts per request when retries are enabled
    pub max_attempts: u32,

    /// Multiplier applied to the delay between consecutive retries
    pub backoff_factor: u32,

    /// Unit delay the backoff factor is applied to
    pub retry_base_delay_ms: u64,

    /// Per-attempt timeout
    pub request_timeout_ms: u64,

    /// Optional proxy for all traffic; empty means direct
    pub proxy_url: String,

    /// Emit retry warnings through `tracing`
    pub enable_logging: bool,

    /// Key the session is persisted under
    pub storage_key: String,

    /// Device type reported at login (`web`, `mobile`, `tablet`, ...)
    pub device_type: String,

    /// Client name reported at login
    pub client_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:4001".to_string(),
            api_prefix: API_PREFIX.to_string(),
            max_attempts: 3,
            backoff_factor: 2,
            retry_base_delay_ms: 1000,
            request_timeout_ms: 30_000,
            proxy_url: String::new(),
            enable_logging: true,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            device_type: "web".to_string(),
            client_name: concat!("dashboard_client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with the `DASHBOARD_*` environment variables.
    ///
    /// Numeric variables that fail to parse are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(ENV_API_URL) {
            config.api_url = url.trim().to_string();
        }
        if let Some(timeout) = parse_env(ENV_API_TIMEOUT) {
            config.request_timeout_ms = timeout;
        }
        if let Some(attempts) = parse_env::<u32>(ENV_API_RETRY_ATTEMPTS) {
            config.max_attempts = attempts.max(1);
        }

        config
    }

    /// Point the client at another backend origin.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// Per-attempt timeout as a `Duration`.
    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}
