#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # dashboard_client: session-aware HTTP client for the admin dashboard API
//!
//! This crate implements the client side of the dashboard backend's
//! authentication contract: every request carries the current access token,
//! transport failures are retried with exponential backoff, and a `401`
//! triggers a single shared token refresh before the request is resent.
//!
//! ## Overview
//!
//! The crate is composed of two cooperating parts:
//!
//! 1. **[`ApiClient`]** - builds, sends, retries and decodes requests
//! 2. **[`SessionStore`]** - owns the signed-in user and token pair, persists
//!    them, and implements login, refresh and logout on top of the client
//!
//! ## Key Features
//!
//! - **Bounded retries**: transport errors are retried up to 3 attempts with
//!   growing delays; HTTP errors are never retried
//! - **Single-flight refresh**: any number of concurrent `401`s cause exactly
//!   one refresh call, and all of them share its outcome
//! - **Guaranteed logout**: local session state is cleared even when the
//!   backend's logout call fails
//! - **Persistence**: the session survives restarts; corrupt data is discarded
//! - **Auth events**: subscribers learn when a session could not be recovered
//! - **Cancellation**: a `CancellationToken` stops a request and its retries
//!
//! ## Usage
//!
//! ```ignore
//! use dashboard_client::{ApiClient, ClientConfig, Credentials, FileStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> dashboard_client::Result<()> {
//!     let storage = Arc::new(FileStorage::new("/var/lib/dashboard"));
//!     let client = ApiClient::with_storage(ClientConfig::from_env(), storage)?;
//!
//!     if !client.session().is_authenticated() {
//!         client.login(Credentials::new("a@b.com", "longenough1")).await?;
//!     }
//!
//!     let mut auth_events = client.subscribe_auth_events();
//!     tokio::spawn(async move {
//!         while auth_events.recv().await.is_ok() {
//!             eprintln!("session expired, please sign in again");
//!         }
//!     });
//!
//!     let users: serde_json::Value = client.get("/users").await?;
//!     println!("{users}");
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[types]** - Session, user, token and wire types
//! - **[error]** - Error taxonomy and result alias
//! - **[client]** - API client, retry engine, refresh coordinator
//! - **[session]** - Session store and persistence backends
//! - **[protocol]** - Endpoint paths, header and URL helpers

pub mod client;
pub mod error;
pub mod protocol;
pub mod session;
pub mod types;

pub use client::{ApiClient, AuthEvent, ClientConfig, RequestOptions};
pub use error::{ApiError, Result, StorageError};
pub use session::{AuthApi, FileStorage, MemoryStorage, SessionStorage, SessionStore};
pub use types::{Credentials, Session, SessionPhase, SessionState, TokenPair, UserRecord};
