//! Authenticated HTTP client for the dashboard backend.
//!
//! This module provides the [`ApiClient`] and the pieces it is built from:
//!
//! - **Request building** with JSON defaults and bearer-token injection
//! - **Response decoding** into typed values or typed errors
//! - **Retry with exponential backoff** for transport failures
//! - **Coordinated token refresh** when requests are rejected with `401`
//! - **Auth events** for UI layers that must react to an expired session
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── api      - ApiClient: the single entry point
//! ├── config   - Client configuration
//! ├── events   - AuthEvent broadcast bus
//! ├── refresh  - Single-flight token refresh
//! ├── request  - RequestOptions and PreparedRequest
//! ├── response - Response decoding
//! └── retry    - Bounded retry with backoff
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ApiClient`] | Main client; clone freely |
//! | [`ClientConfig`] | Client configuration options |
//! | [`RequestOptions`] | Per-call method, body, headers and flags |
//! | [`RefreshCoordinator`] | Shares one refresh among concurrent `401`s |
//! | [`RetryPolicy`] | Attempt budget and backoff |
//! | [`AuthEventBus`] | Broadcasts [`AuthEvent`]s |
//!
//! # Examples
//!
//! ## Creating a Client
//!
//! ```
//! use dashboard_client::client::{ApiClient, ClientConfig};
//!
//! let config = ClientConfig {
//!     max_attempts: 5,
//!     retry_base_delay_ms: 200,
//!     ..ClientConfig::default()
//! };
//! let client = ApiClient::in_memory(config).unwrap();
//! assert_eq!(client.url("users"), "http://localhost:4001/api/v1/users");
//! ```
//!
//! ## Backoff
//!
//! ```
//! use dashboard_client::client::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay_for(3), Duration::from_secs(2));
//! assert_eq!(policy.delay_for(2), Duration::from_secs(4));
//! ```

mod api;
mod config;
mod events;
mod refresh;
mod request;
mod response;
mod retry;

pub use api::ApiClient;
pub use config::ClientConfig;
pub use events::{AuthEvent, AuthEventBus};
pub use refresh::RefreshCoordinator;
pub use request::{build_headers, PreparedRequest, RequestOptions};
pub use response::{decode_response, decode_success, http_error};
pub use retry::{send_with_retry, RetryPolicy};
