//! Durable storage for the session.
//!
//! The store persists the session through a [`SessionStorage`] backend as a
//! JSON envelope:
//!
//! ```json
//! {"state": {"user": {...}, "tokens": {...}, "deviceInfo": {...}, "isAuthenticated": true}, "version": 0}
//! ```
//!
//! Loading, the loading flag and the last error message are never persisted.
//! Data that fails to parse is removed from the backend and treated as
//! absent.

use crate::error::StorageError;
use crate::protocol::STORAGE_VERSION;
use crate::types::Session;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key/value backend for the persisted session.
pub trait SessionStorage: Send + Sync + Debug {
    /// Raw value stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage; cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value under `key` without going through the trait.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`; the directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SessionStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        // Write-then-rename so a crash never leaves a half-written session.
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

#[derive(Serialize)]
struct EnvelopeOut<'a> {
    state: &'a Session,
    version: u32,
}

// `version` is accepted and ignored; there has only ever been one layout.
#[derive(Deserialize)]
struct EnvelopeIn {
    state: Session,
}

/// Encode `session` into the persisted envelope.
pub fn encode_session(session: &Session) -> Result<String, StorageError> {
    Ok(serde_json::to_string(&EnvelopeOut {
        state: session,
        version: STORAGE_VERSION,
    })?)
}

/// Decode a persisted envelope; `None` if it is not valid.
pub fn decode_session(raw: &str) -> Option<Session> {
    serde_json::from_str::<EnvelopeIn>(raw)
        .ok()
        .map(|envelope| envelope.state.normalized())
}

/// Write `session` under `key`, logging instead of failing.
pub(crate) fn persist(storage: &dyn SessionStorage, key: &str, session: &Session) {
    let result = encode_session(session).and_then(|raw| storage.save(key, &raw));
    if let Err(err) = result {
        tracing::warn!(key, "failed to persist session: {}", err);
    }
}

/// Read the session under `key`, discarding anything unreadable.
pub(crate) fn rehydrate(storage: &dyn SessionStorage, key: &str) -> Session {
    let raw = match storage.load(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Session::default(),
        Err(err) => {
            tracing::warn!(key, "failed to load persisted session: {}", err);
            return Session::default();
        }
    };

    match decode_session(&raw) {
        Some(session) => {
            tracing::debug!(key, authenticated = session.is_authenticated, "session rehydrated");
            session
        }
        None => {
            tracing::warn!(key, "discarding corrupted persisted session");
            if let Err(err) = storage.remove(key) {
                tracing::warn!(key, "failed to remove corrupted session: {}", err);
            }
            Session::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{fixtures, DeviceInfo, TokenPair};

    fn authenticated() -> Session {
        Session::authenticated(
            fixtures::user(),
            TokenPair::new("T1", "R1"),
            Some(DeviceInfo::generate("web", "test")),
        )
    }

    #[test]
    fn test_round_trip() {
        let storage = MemoryStorage::new();
        let session = authenticated();

        persist(&storage, "auth-storage", &session);
        let restored = rehydrate(&storage, "auth-storage");

        assert_eq!(restored.user, session.user);
        assert_eq!(restored.tokens, session.tokens);
        assert_eq!(restored.is_authenticated, session.is_authenticated);
        assert_eq!(restored, session);
    }

    #[test]
    fn test_envelope_shape() {
        let raw = encode_session(&authenticated()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["version"], 0);
        assert_eq!(json["state"]["tokens"]["accessToken"], "T1");
        assert_eq!(json["state"]["isAuthenticated"], true);
        assert!(json["state"].get("isLoading").is_none());
        assert!(json["state"].get("error").is_none());
    }

    #[test]
    fn test_corrupted_data_is_discarded() {
        let storage = MemoryStorage::new();
        storage.save("auth-storage", "{\"state\": {\"user\": ").unwrap();

        let restored = rehydrate(&storage, "auth-storage");

        assert_eq!(restored, Session::default());
        assert!(storage.get("auth-storage").is_none());
    }

    #[test]
    fn test_rehydrate_repairs_authenticated_flag() {
        let storage = MemoryStorage::new();
        storage
            .save(
                "auth-storage",
                r#"{"state": {"user": null, "tokens": {"accessToken": "T1", "refreshToken": "R1"}, "isAuthenticated": true}, "version": 0}"#,
            )
            .unwrap();

        let restored = rehydrate(&storage, "auth-storage");
        assert!(!restored.is_authenticated);
        assert_eq!(restored.tokens, Some(TokenPair::new("T1", "R1")));
    }

    #[test]
    fn test_missing_key_is_anonymous() {
        let storage = MemoryStorage::new();
        assert_eq!(rehydrate(&storage, "nothing-here"), Session::default());
    }

    #[test]
    fn test_file_storage() {
        let dir = std::env::temp_dir().join(format!("dashboard-client-{}", uuid::Uuid::new_v4()));
        let storage = FileStorage::new(&dir);

        assert_eq!(storage.load("auth-storage").unwrap(), None);
        storage.remove("auth-storage").unwrap();

        persist(&storage, "auth-storage", &authenticated());
        assert!(dir.join("auth-storage.json").exists());
        assert!(rehydrate(&storage, "auth-storage").is_authenticated);

        storage.remove("auth-storage").unwrap();
        assert_eq!(storage.load("auth-storage").unwrap(), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
