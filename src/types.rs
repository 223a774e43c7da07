//! Session and wire types.
//!
//! Wire types mirror the backend's camelCase JSON. Session types are what
//! the [`SessionStore`](crate::SessionStore) holds and persists.

use crate::error::{ApiError, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Shortest password the login form accepts.
pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Access/refresh credential pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer credential
    pub access_token: String,
    /// Long-lived credential used only to obtain a new pair
    pub refresh_token: String,
}

impl TokenPair {
    /// Create a token pair.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Identity and authorization attributes of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Backend identifier
    #[serde(rename = "_id")]
    pub id: String,
    /// Login email
    pub email: String,
    /// Given name
    #[serde(default)]
    pub first_name: String,
    /// Family name
    #[serde(default)]
    pub last_name: String,
    /// Role names
    #[serde(default)]
    pub roles: Vec<String>,
    /// Permission names
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Whether the account is enabled
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Previous login
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    /// Account creation
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl UserRecord {
    /// "First Last", falling back to the email when both names are empty.
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let name = name.trim();
        if name.is_empty() {
            self.email.clone()
        } else {
            name.to_string()
        }
    }

    /// Whether the user holds `role`.
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the user holds `permission`.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Identifies this client installation to the backend at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Random per-login identifier, `<device_type>-<uuid>`
    pub device_id: String,
    /// `web`, `mobile`, `tablet`, ...
    pub device_type: String,
    /// Client software name
    #[serde(alias = "browserName")]
    pub client_name: String,
}

impl DeviceInfo {
    /// Generate device info with a fresh random identifier.
    pub fn generate(device_type: &str, client_name: &str) -> Self {
        Self {
            device_id: format!("{}-{}", device_type, uuid::Uuid::new_v4().simple()),
            device_type: device_type.to_string(),
            client_name: client_name.to_string(),
        }
    }
}

/// Email/password pair submitted at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login email
    pub email: String,
    /// Plain-text password, sent over the transport only
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Check the pair before it is sent: a well-formed email and a password
    /// of at least [`MIN_PASSWORD_LEN`] characters.
    pub fn validate(&self) -> Result<()> {
        let email_ok = EMAIL_PATTERN
            .as_ref()
            .is_some_and(|re| re.is_match(self.email.trim()));
        if !email_ok {
            return Err(ApiError::Validation("Please enter a valid email".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ApiError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        Ok(())
    }
}

/// The persisted part of the session.
///
/// # Invariants
///
/// `is_authenticated` is true iff both `user` and `tokens` are present.
/// Constructors and [`Session::normalized`] enforce this.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Session {
    /// Signed-in user
    pub user: Option<UserRecord>,
    /// Current credentials
    pub tokens: Option<TokenPair>,
    /// Device registered at login
    pub device_info: Option<DeviceInfo>,
    /// Derived flag, stored for compatibility with existing persisted data
    pub is_authenticated: bool,
}

impl Session {
    /// An authenticated session.
    pub fn authenticated(user: UserRecord, tokens: TokenPair, device_info: Option<DeviceInfo>) -> Self {
        Self {
            user: Some(user),
            tokens: Some(tokens),
            device_info,
            is_authenticated: true,
        }
    }

    /// Recompute `is_authenticated` from the presence of user and tokens.
    pub fn normalized(mut self) -> Self {
        self.is_authenticated = self.user.is_some() && self.tokens.is_some();
        self
    }
}

/// Login lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No credentials held
    Anonymous,
    /// A login call is in flight
    Authenticating,
    /// User and tokens held
    Authenticated,
}

/// Full store state: the persisted session plus transient UI-facing fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    /// Persisted part
    pub session: Session,
    /// A login call is in flight
    pub is_loading: bool,
    /// Message of the last failed login
    pub error: Option<String>,
}

impl SessionState {
    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        if self.session.is_authenticated {
            SessionPhase::Authenticated
        } else if self.is_loading {
            SessionPhase::Authenticating
        } else {
            SessionPhase::Anonymous
        }
    }

    /// Current access token, if authenticated.
    pub fn access_token(&self) -> Option<&str> {
        self.session.tokens.as_ref().map(|t| t.access_token.as_str())
    }
}

/// Standard `{status, message, data}` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    /// Backend status tag, e.g. `"success"`
    #[serde(default)]
    pub status: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Payload
    pub data: T,
}

/// Payload of a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    /// New access token
    #[serde(default)]
    pub access_token: String,
    /// New refresh token
    #[serde(default)]
    pub refresh_token: String,
    /// Signed-in user
    pub user: UserRecord,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: u64,
}

/// Payload of a successful refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    /// New access token
    pub access_token: String,
    /// New refresh token
    pub refresh_token: String,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: u64,
}

/// Status/message acknowledgement (logout).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Acknowledgement {
    /// Backend status tag
    #[serde(default)]
    pub status: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    /// Login email
    pub email: &'a str,
    /// Password
    pub password: &'a str,
    /// Device registering this session
    pub device_info: &'a DeviceInfo,
}

/// Body of `POST /auth/refresh-token`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    /// Current refresh token
    pub refresh_token: &'a str,
}

/// Body of `POST /auth/logout`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest<'a> {
    /// Refresh token to revoke
    pub refresh_token: &'a str,
    /// Revoke every session of this user
    pub all_devices: bool,
}
