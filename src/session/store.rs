//! The session store.
//!
//! [`SessionStore`] owns the only mutable shared state of the client: the
//! signed-in user and the token pair. Every mutation goes through
//! [`login`](SessionStore::login), [`refresh_token`](SessionStore::refresh_token),
//! [`logout`](SessionStore::logout) or [`clear`](SessionStore::clear), and
//! every mutation is persisted.
//!
//! Network calls go through the [`AuthApi`] seam, implemented by
//! [`ApiClient`](crate::ApiClient) for real use and by fakes in tests.
//!
//! State changes are published on a `watch` channel; see
//! [`SessionStore::subscribe`].

use super::storage::{persist, rehydrate, MemoryStorage, SessionStorage};
use crate::client::ClientConfig;
use crate::error::{ApiError, Result};
use crate::types::{
    Acknowledgement, Credentials, DeviceInfo, LoginData, RefreshData, Session, SessionState,
    TokenPair, UserRecord,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Backend calls the session store depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, credentials: &Credentials, device: &DeviceInfo) -> Result<LoginData>;

    /// `POST /auth/refresh-token`, authorized with the expiring access token
    async fn refresh(&self, tokens: &TokenPair) -> Result<RefreshData>;

    /// `POST /auth/logout`, authorized with the current access token
    async fn logout(&self, tokens: &TokenPair, all_devices: bool) -> Result<Acknowledgement>;
}

/// Authenticated-session state with persistence.
#[derive(Debug)]
pub struct SessionStore {
    state: watch::Sender<SessionState>,
    storage: Arc<dyn SessionStorage>,
    key: String,
    device_type: String,
    client_name: String,
}

impl SessionStore {
    /// Open the store, rehydrating any session persisted under
    /// `config.storage_key`.
    pub fn open(storage: Arc<dyn SessionStorage>, config: &ClientConfig) -> Self {
        let session = rehydrate(storage.as_ref(), &config.storage_key);
        let (state, _) = watch::channel(SessionState {
            session,
            ..SessionState::default()
        });

        Self {
            state,
            storage,
            key: config.storage_key.clone(),
            device_type: config.device_type.clone(),
            client_name: config.client_name.clone(),
        }
    }

    /// A store backed by fresh in-memory storage.
    pub fn in_memory(config: &ClientConfig) -> Self {
        Self::open(Arc::new(MemoryStorage::new()), config)
    }

    // ========== Reads ==========

    /// Snapshot of the full state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Snapshot of the persisted part.
    pub fn session(&self) -> Session {
        self.state.borrow().session.clone()
    }

    /// Signed-in user.
    pub fn user(&self) -> Option<UserRecord> {
        self.state.borrow().session.user.clone()
    }

    /// Current token pair.
    pub fn tokens(&self) -> Option<TokenPair> {
        self.state.borrow().session.tokens.clone()
    }

    /// Current access token.
    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token().map(str::to_string)
    }

    /// Whether a user and token pair are held.
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().session.is_authenticated
    }

    /// Receive every subsequent state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ========== Operations ==========

    /// Sign in with `credentials`.
    ///
    /// Credentials are validated first; invalid ones never reach the backend.
    /// On failure the error message is recorded in the state, user and tokens
    /// are cleared and the error is returned.
    pub async fn login<A: AuthApi + ?Sized>(
        &self,
        api: &A,
        credentials: &Credentials,
    ) -> Result<LoginData> {
        if let Err(err) = credentials.validate() {
            tracing::debug!(email = %credentials.email, "credentials rejected: {}", err);
            return Err(self.record_login_failure(err));
        }

        let device = DeviceInfo::generate(&self.device_type, &self.client_name);
        self.update(|state| {
            state.is_loading = true;
            state.error = None;
            state.session.device_info = Some(device.clone());
        });

        let outcome = match api.login(credentials, &device).await {
            Ok(data) if data.access_token.is_empty() => {
                Err(ApiError::network("No access token received"))
            }
            other => other,
        };

        match outcome {
            Ok(data) => {
                let tokens = TokenPair::new(&data.access_token, &data.refresh_token);
                self.update(|state| {
                    state.session = Session::authenticated(data.user.clone(), tokens, Some(device));
                    state.is_loading = false;
                });
                tracing::info!(user = %data.user.email, "logged in");
                Ok(data)
            }
            Err(err) => {
                tracing::error!("login failed: {}", err);
                tracing::debug!(email = %credentials.email, "login rejected");
                Err(self.record_login_failure(err))
            }
        }
    }

    fn record_login_failure(&self, err: ApiError) -> ApiError {
        self.update(|state| {
            state.error = Some(err.to_string());
            state.is_loading = false;
            state.session.user = None;
            state.session.tokens = None;
            state.session.is_authenticated = false;
        });
        err
    }

    /// Exchange the refresh token for a new pair and return the new access
    /// token.
    ///
    /// Any failure logs the session out before the error is returned.
    pub async fn refresh_token<A: AuthApi + ?Sized>(&self, api: &A) -> Result<String> {
        let outcome = match self.tokens().filter(|t| !t.refresh_token.is_empty()) {
            Some(tokens) => api.refresh(&tokens).await,
            None => Err(ApiError::network("No refresh token available")),
        };

        match outcome {
            Ok(data) => {
                let tokens = TokenPair::new(&data.access_token, &data.refresh_token);
                self.update(|state| {
                    state.session.tokens = Some(tokens);
                    state.session.is_authenticated = state.session.user.is_some();
                    state.error = None;
                });
                tracing::info!(expires_in = data.expires_in, "access token refreshed");
                Ok(data.access_token)
            }
            Err(err) => {
                tracing::warn!("token refresh failed: {}", err);
                self.logout(api, false).await;
                Err(err)
            }
        }
    }

    /// Sign out.
    ///
    /// The remote call is best-effort: its failure is logged and never
    /// returned. Local state is cleared in every case, including when this
    /// future is dropped before the remote call finishes.
    pub async fn logout<A: AuthApi + ?Sized>(&self, api: &A, all_devices: bool) {
        let _clear = ClearOnDrop(self);

        match self.tokens().filter(|t| !t.refresh_token.is_empty()) {
            Some(tokens) => {
                if let Err(err) = api.logout(&tokens, all_devices).await {
                    tracing::warn!("remote logout failed: {}", err);
                }
            }
            None => tracing::warn!("remote logout skipped: no refresh token available"),
        }
        tracing::info!(all_devices, "logged out");
    }

    /// Drop user, tokens and device locally, without contacting the backend.
    pub fn clear(&self) {
        self.update(|state| {
            state.session = Session::default();
            state.error = None;
        });
    }

    /// Forget the last login error.
    pub fn clear_error(&self) {
        self.update(|state| state.error = None);
    }

    fn update(&self, mutate: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(mutate);
        let session = self.session();
        persist(self.storage.as_ref(), &self.key, &session);
    }
}

struct ClearOnDrop<'a>(&'a SessionStore);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::decode_session;
    use crate::types::fixtures;
    use parking_lot::Mutex;
    use std::time::Duration;

    fn unauthorized() -> ApiError {
        ApiError::Http {
            status: 401,
            status_text: "Unauthorized".to_string(),
            body: serde_json::json!({"message": "Invalid credentials"}),
        }
    }

    #[derive(Default)]
    struct FakeAuth {
        login: Mutex<Option<Result<LoginData>>>,
        refresh: Mutex<Option<Result<RefreshData>>>,
        logout_fails: bool,
        logout_hangs: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeAuth {
        fn accepting(access: &str, refresh: &str) -> Self {
            let fake = Self::default();
            *fake.login.lock() = Some(Ok(LoginData {
                access_token: access.to_string(),
                refresh_token: refresh.to_string(),
                user: fixtures::user(),
                expires_in: 900,
            }));
            fake
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl AuthApi for FakeAuth {
        async fn login(&self, credentials: &Credentials, device: &DeviceInfo) -> Result<LoginData> {
            self.calls
                .lock()
                .push(format!("login {} {}", credentials.email, device.device_type));
            self.login.lock().take().unwrap_or_else(|| Err(unauthorized()))
        }

        async fn refresh(&self, tokens: &TokenPair) -> Result<RefreshData> {
            self.calls
                .lock()
                .push(format!("refresh {} {}", tokens.access_token, tokens.refresh_token));
            self.refresh.lock().take().unwrap_or_else(|| Err(unauthorized()))
        }

        async fn logout(&self, tokens: &TokenPair, all_devices: bool) -> Result<Acknowledgement> {
            self.calls
                .lock()
                .push(format!("logout {} {}", tokens.refresh_token, all_devices));
            if self.logout_hangs {
                std::future::pending::<()>().await;
            }
            if self.logout_fails {
                return Err(ApiError::network("connection refused"));
            }
            Ok(Acknowledgement::default())
        }
    }

    fn store_with(storage: &MemoryStorage) -> SessionStore {
        SessionStore::open(Arc::new(storage.clone()), &ClientConfig::default())
    }

    async fn logged_in(storage: &MemoryStorage) -> SessionStore {
        let store = store_with(storage);
        let api = FakeAuth::accepting("T1", "R1");
        store
            .login(&api, &Credentials::new("a@b.com", "longenough1"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_login_success_authenticates_and_persists() {
        let storage = MemoryStorage::new();
        let store = store_with(&storage);
        let api = FakeAuth::accepting("T1", "R1");

        let data = store
            .login(&api, &Credentials::new("a@b.com", "longenough1"))
            .await
            .unwrap();

        assert_eq!(data.access_token, "T1");
        assert!(store.is_authenticated());
        assert_eq!(store.tokens(), Some(TokenPair::new("T1", "R1")));
        assert_eq!(store.user().unwrap().email, "a@b.com");
        assert!(!store.state().is_loading);
        assert_eq!(api.calls(), vec!["login a@b.com web".to_string()]);

        let persisted = decode_session(&storage.get("auth-storage").unwrap()).unwrap();
        assert_eq!(persisted, store.session());
        assert!(persisted.device_info.is_some());
    }

    #[tokio::test]
    async fn test_login_failure_records_error() {
        let store = store_with(&MemoryStorage::new());
        let api = FakeAuth::default();

        let err = store
            .login(&api, &Credentials::new("a@b.com", "wrong-password"))
            .await
            .unwrap_err();

        assert!(err.is_unauthorized());
        let state = store.state();
        assert!(!state.session.is_authenticated);
        assert!(state.session.tokens.is_none());
        assert_eq!(state.error.as_deref(), Some("API Error: 401 Unauthorized"));

        store.clear_error();
        assert_eq!(store.state().error, None);
    }

    #[tokio::test]
    async fn test_invalid_credentials_never_reach_backend() {
        let store = store_with(&MemoryStorage::new());
        let api = FakeAuth::accepting("T1", "R1");

        let err = store
            .login(&api, &Credentials::new("x", ""))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Validation("Please enter a valid email".to_string()));
        assert_eq!(store.state().error.as_deref(), Some("Please enter a valid email"));

        let err = store
            .login(&api, &Credentials::new("a@b.com", "short"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Password must be at least 8 characters");

        assert!(api.calls().is_empty());
        assert!(!store.is_authenticated());
        assert!(!store.state().is_loading);
    }

    #[tokio::test]
    async fn test_login_without_access_token_fails() {
        let store = store_with(&MemoryStorage::new());
        let api = FakeAuth::accepting("", "R1");

        let err = store
            .login(&api, &Credentials::new("a@b.com", "longenough1"))
            .await
            .unwrap_err();

        assert_eq!(err, ApiError::network("No access token received"));
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_replaces_tokens() {
        let storage = MemoryStorage::new();
        let store = logged_in(&storage).await;
        let api = FakeAuth::default();
        *api.refresh.lock() = Some(Ok(RefreshData {
            access_token: "T2".to_string(),
            refresh_token: "R2".to_string(),
            expires_in: 900,
        }));

        let token = store.refresh_token(&api).await.unwrap();

        assert_eq!(token, "T2");
        assert_eq!(api.calls(), vec!["refresh T1 R1".to_string()]);
        assert_eq!(store.tokens(), Some(TokenPair::new("T2", "R2")));
        assert!(store.is_authenticated());
        let persisted = decode_session(&storage.get("auth-storage").unwrap()).unwrap();
        assert_eq!(persisted.tokens, Some(TokenPair::new("T2", "R2")));
    }

    #[tokio::test]
    async fn test_refresh_failure_logs_out() {
        let store = logged_in(&MemoryStorage::new()).await;
        let api = FakeAuth::default();

        let err = store.refresh_token(&api).await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(!store.is_authenticated());
        assert_eq!(store.tokens(), None);
        assert_eq!(
            api.calls(),
            vec!["refresh T1 R1".to_string(), "logout R1 false".to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_without_tokens() {
        let store = store_with(&MemoryStorage::new());
        let api = FakeAuth::default();

        let err = store.refresh_token(&api).await.unwrap_err();

        assert_eq!(err, ApiError::network("No refresh token available"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let storage = MemoryStorage::new();
        let store = logged_in(&storage).await;
        let api = FakeAuth {
            logout_fails: true,
            ..FakeAuth::default()
        };

        store.logout(&api, true).await;

        assert_eq!(api.calls(), vec!["logout R1 true".to_string()]);
        assert_eq!(store.session(), Session::default());
        let persisted = decode_session(&storage.get("auth-storage").unwrap()).unwrap();
        assert_eq!(persisted, Session::default());
    }

    #[tokio::test]
    async fn test_logout_clears_when_cancelled() {
        let store = logged_in(&MemoryStorage::new()).await;
        let api = FakeAuth {
            logout_hangs: true,
            ..FakeAuth::default()
        };

        let timed_out = tokio::time::timeout(Duration::from_millis(20), store.logout(&api, false)).await;

        assert!(timed_out.is_err());
        assert!(!store.is_authenticated());
        assert_eq!(store.tokens(), None);
    }

    #[tokio::test]
    async fn test_rehydrate_on_open() {
        let storage = MemoryStorage::new();
        let original = logged_in(&storage).await.session();

        let reopened = store_with(&storage);

        assert_eq!(reopened.session(), original);
        assert_eq!(reopened.access_token().as_deref(), Some("T1"));
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let store = store_with(&MemoryStorage::new());
        let mut changes = store.subscribe();
        let api = FakeAuth::accepting("T1", "R1");

        store
            .login(&api, &Credentials::new("a@b.com", "longenough1"))
            .await
            .unwrap();

        assert!(changes.has_changed().unwrap());
        assert!(changes.borrow_and_update().session.is_authenticated);

        store.clear();
        assert!(changes.has_changed().unwrap());
        assert!(!changes.borrow_and_update().session.is_authenticated);
    }
}
