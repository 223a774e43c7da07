//! The API client.
//!
//! [`ApiClient`] is the single entry point for calls to the dashboard
//! backend. A call goes through these steps:
//!
//! 1. resolve the bearer token (explicit option, else the session's access token)
//! 2. build the URL: `api_url` + `api_prefix` + normalized endpoint
//! 3. send through the retry engine (`max_attempts`, or 1 with `skip_retry`)
//! 4. on `401` without `skip_auth`, refresh the token through the
//!    [`RefreshCoordinator`] and resend once with the new token
//!
//! The refresh runs detached from the caller that triggered it and always
//! completes. When the refresh fails the session is cleared, [`AuthEvent::AuthFailed`]
//! is emitted once for that refresh, and every request waiting on it fails
//! with the refresh error.
//!
//! # Examples
//!
//! ```ignore
//! use dashboard_client::{ApiClient, ClientConfig, Credentials};
//!
//! #[tokio::main]
//! async fn main() -> dashboard_client::Result<()> {
//!     let client = ApiClient::in_memory(ClientConfig::from_env())?;
//!     client.login(Credentials::new("a@b.com", "longenough1")).await?;
//!
//!     let stats: serde_json::Value = client.get("/dashboard/stats").await?;
//!     println!("{stats}");
//!
//!     client.logout(false).await;
//!     Ok(())
//! }
//! ```

use super::config::ClientConfig;
use super::events::{AuthEvent, AuthEventBus};
use super::refresh::RefreshCoordinator;
use super::request::{PreparedRequest, RequestOptions};
use super::response::decode_response;
use super::retry::{send_with_retry, RetryPolicy};
use crate::error::{ApiError, Result};
use crate::protocol::{build_url, endpoints};
use crate::session::{AuthApi, SessionStorage, SessionStore};
use crate::types::{
    Acknowledgement, Credentials, DeviceInfo, Envelope, LoginData, LoginRequest, LogoutRequest,
    RefreshData, RefreshRequest, TokenPair,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Authenticated HTTP client for the dashboard backend.
///
/// Cloning is cheap; clones share the connection pool, session store,
/// refresh coordinator and event bus.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    policy: RetryPolicy,
    session: Arc<SessionStore>,
    coordinator: Arc<RefreshCoordinator>,
    events: AuthEventBus,
}

impl ApiClient {
    /// Create a client over an existing session store.
    ///
    /// Fails when `config.api_url` is empty or not a valid URL.
    pub fn new(config: ClientConfig, session: Arc<SessionStore>) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            return Err(ApiError::network("API URL is not configured"));
        }
        url::Url::parse(&config.api_url)?;

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .pool_idle_timeout(Duration::from_secs(90));

        if !config.proxy_url.is_empty() {
            builder = builder.proxy(reqwest::Proxy::all(&config.proxy_url)?);
        }

        Ok(Self {
            http: builder.build()?,
            policy: RetryPolicy::from_config(&config),
            config: Arc::new(config),
            session,
            coordinator: Arc::new(RefreshCoordinator::new()),
            events: AuthEventBus::new(),
        })
    }

    /// Create a client whose session is persisted in `storage`.
    pub fn with_storage(config: ClientConfig, storage: Arc<dyn SessionStorage>) -> Result<Self> {
        let session = Arc::new(SessionStore::open(storage, &config));
        Self::new(config, session)
    }

    /// Create a client with a non-persistent session.
    pub fn in_memory(config: ClientConfig) -> Result<Self> {
        let session = Arc::new(SessionStore::in_memory(&config));
        Self::new(config, session)
    }

    // ========== Requests ==========

    /// Send a request and decode the JSON response.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let url = self.url(endpoint);
        let token = options.token.clone().or_else(|| self.session.access_token());
        let prepared = PreparedRequest::new(url, &options, token.as_deref())?;
        let attempts = if options.skip_retry {
            1
        } else {
            self.policy.max_attempts
        };
        let cancel = options.cancel.as_ref();

        match self.dispatch(&prepared, attempts, cancel).await {
            Err(err) if err.is_unauthorized() && !options.skip_auth => {
                tracing::debug!(url = %prepared.url, "unauthorized, refreshing token");
                let token = self.refresh_token().await?;
                let retried = prepared.with_token(&token)?;
                self.dispatch(&retried, 1, cancel).await
            }
            outcome => outcome,
        }
    }

    /// `GET endpoint`
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.request(endpoint, RequestOptions::new()).await
    }

    /// `POST endpoint` with a JSON body
    pub async fn post<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, endpoint, body).await
    }

    /// `PUT endpoint` with a JSON body
    pub async fn put<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PUT, endpoint, body).await
    }

    /// `PATCH endpoint` with a JSON body
    pub async fn patch<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(Method::PATCH, endpoint, body).await
    }

    /// `DELETE endpoint`
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        self.request(endpoint, RequestOptions::new().with_method(Method::DELETE))
            .await
    }

    async fn send_json<B, T>(&self, method: Method, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = RequestOptions::new().with_method(method).with_json(body)?;
        self.request(endpoint, options).await
    }

    // ========== Session ==========

    /// Sign in; see [`SessionStore::login`].
    pub async fn login(&self, credentials: Credentials) -> Result<LoginData> {
        self.session.login(self, &credentials).await
    }

    /// Sign out; see [`SessionStore::logout`].
    pub async fn logout(&self, all_devices: bool) {
        self.session.logout(self, all_devices).await
    }

    /// Refresh the access token, joining any refresh already in flight.
    ///
    /// The refresh runs on its own task, so dropping this future does not
    /// cancel it: the new token pair is still stored and other callers still
    /// receive it.
    ///
    /// On failure the session is cleared and [`AuthEvent::AuthFailed`] is
    /// emitted, once per failed refresh regardless of how many callers
    /// were waiting on it.
    pub async fn refresh_token(&self) -> Result<String> {
        let client = self.clone();
        self.coordinator
            .refresh(move || async move {
                match client.session.refresh_token(&client).await {
                    Ok(token) => Ok(token),
                    Err(err) => {
                        tracing::error!("session expired, token refresh failed: {}", err);
                        client.session.clear();
                        client.events.emit(AuthEvent::AuthFailed);
                        Err(err)
                    }
                }
            })
            .await
    }

    // ========== Accessors ==========

    /// The session store.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Listen for [`AuthEvent`]s.
    pub fn subscribe_auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// The refresh coordinator.
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Full URL for `endpoint`.
    pub fn url(&self, endpoint: &str) -> String {
        build_url(&self.config.api_url, &self.config.api_prefix, endpoint)
    }

    // ========== Internals ==========

    async fn dispatch<T: DeserializeOwned>(
        &self,
        request: &PreparedRequest,
        attempts: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<T> {
        tracing::debug!(method = %request.method, url = %request.url, attempts, "dispatching request");
        let http = &self.http;
        send_with_retry(
            move || async move {
                let response = request.to_builder(http).send().await?;
                decode_response::<T>(response).await
            },
            attempts,
            &self.policy,
            cancel,
            self.config.enable_logging,
        )
        .await
    }

    /// Auth endpoints are sent straight to the retry engine: a `401` from
    /// them is final and never starts a nested refresh.
    async fn auth_call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let prepared = PreparedRequest::new(self.url(endpoint), &options, options.token.as_deref())?;
        self.dispatch(&prepared, self.policy.max_attempts, None).await
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, credentials: &Credentials, device: &DeviceInfo) -> Result<LoginData> {
        let body = LoginRequest {
            email: &credentials.email,
            password: &credentials.password,
            device_info: device,
        };
        let options = RequestOptions::new()
            .with_method(Method::POST)
            .with_json(&body)?
            .skip_auth();
        let envelope: Envelope<LoginData> = self.auth_call(endpoints::LOGIN, options).await?;
        Ok(envelope.data)
    }

    async fn refresh(&self, tokens: &TokenPair) -> Result<RefreshData> {
        let body = RefreshRequest {
            refresh_token: &tokens.refresh_token,
        };
        let options = RequestOptions::new()
            .with_method(Method::POST)
            .with_json(&body)?
            .with_token(&tokens.access_token)
            .skip_auth();
        let envelope: Envelope<RefreshData> =
            self.auth_call(endpoints::REFRESH_TOKEN, options).await?;
        Ok(envelope.data)
    }

    async fn logout(&self, tokens: &TokenPair, all_devices: bool) -> Result<Acknowledgement> {
        let body = LogoutRequest {
            refresh_token: &tokens.refresh_token,
            all_devices,
        };
        let options = RequestOptions::new()
            .with_method(Method::POST)
            .with_json(&body)?
            .with_token(&tokens.access_token)
            .skip_auth();
        self.auth_call(endpoints::LOGOUT, options).await
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("authenticated", &self.session.is_authenticated())
            .finish()
    }
}
