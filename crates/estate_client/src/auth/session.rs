//! Process-wide session (token) store.
//!
//! Holds the signed-in user together with the access/refresh token pair and
//! mirrors every change into a single durable slot so the session survives a
//! restart. Only the auth flows write here; everything else reads snapshots.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::masking::mask_secret;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub role: String,
}

/// Snapshot of the authentication state. Both tokens are present, or both are
/// absent together with `user` (logged out).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Option<User>,
    #[serde(rename = "token")]
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some()
    }
}

/// A single durable key/value slot holding the serialized session.
pub trait SessionStorage: Send + Sync {
    /// Returns the stored payload, if any.
    fn load(&self) -> Option<String>;

    fn save(&self, payload: &str) -> io::Result<()>;

    fn remove(&self) -> io::Result<()>;
}

/// Stores the session as one JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStorage for FileSessionStorage {
    fn load(&self) -> Option<String> {
        fs::read_to_string(&self.path).ok()
    }

    fn save(&self, payload: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, payload)
    }

    fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

/// In-memory slot. Clones share the same slot, which lets tests simulate a
/// restart by building a second store over a clone.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStorage {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn load(&self) -> Option<String> {
        self.raw()
    }

    fn save(&self, payload: &str) -> io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.to_string());
        Ok(())
    }

    fn remove(&self) -> io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

pub struct SessionStore {
    state: RwLock<Session>,
    storage: Box<dyn SessionStorage>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Seeds the store from the persisted slot. A missing or unreadable slot
    /// means logged out.
    pub fn load<S: SessionStorage + 'static>(storage: S) -> Self {
        let session = match storage.load() {
            Some(payload) => match serde_json::from_str::<Session>(&payload) {
                Ok(session) if session.is_authenticated() => session,
                Ok(_) => Session::default(),
                Err(err) => {
                    warn!("Discarding unreadable persisted session: {err}");
                    Session::default()
                }
            },
            None => Session::default(),
        };
        if let Some(user) = &session.user {
            info!("Restored session for {}", user.email);
        }
        Self {
            state: RwLock::new(session),
            storage: Box::new(storage),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Session {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token
            .clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state.read().unwrap_or_else(PoisonError::into_inner).user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_authenticated()
    }

    /// Replaces the whole session and persists it.
    pub fn set_session(&self, user: Option<User>, access_token: String, refresh_token: String) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = Session {
            user,
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
        };
        info!(
            "Session set for {}",
            state.user.as_ref().map(|u| u.email.as_str()).unwrap_or("<unknown user>")
        );
        self.persist(&state);
    }

    /// Swaps only the access token, keeping user and refresh token.
    pub fn set_access_token(&self, access_token: String) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.refresh_token.is_none() {
            debug!("Ignoring access token update on a logged-out session");
            return;
        }
        debug!("Access token replaced with {}", mask_secret(&access_token));
        state.access_token = Some(access_token);
        self.persist(&state);
    }

    /// Installs a rotated token pair, keeping the user, but only while the
    /// stored refresh token is still `expected`. Returns whether it applied.
    pub fn rotate_tokens(&self, expected: &str, access_token: String, refresh_token: String) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.refresh_token.as_deref() != Some(expected) {
            debug!("Stored refresh token changed, rotation skipped");
            return false;
        }
        debug!("Access token replaced with {}", mask_secret(&access_token));
        state.access_token = Some(access_token);
        state.refresh_token = Some(refresh_token);
        self.persist(&state);
        true
    }

    /// Resets to logged out and removes the persisted slot.
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = Session::default();
        if let Err(err) = self.storage.remove() {
            warn!("Failed to remove persisted session: {err}");
        }
        info!("Session cleared");
    }

    // Called with the write lock held so the slot never lags behind memory.
    fn persist(&self, session: &Session) {
        let result = serde_json::to_string(session)
            .map_err(io::Error::from)
            .and_then(|payload| self.storage.save(&payload));
        if let Err(err) = result {
            warn!("Failed to persist session: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn alice() -> User {
        User {
            id: 1,
            email: "a@b.com".to_string(),
            role: "investor".to_string(),
        }
    }

    #[test]
    fn starts_logged_out_without_persisted_state() {
        let store = SessionStore::load(MemorySessionStorage::new());
        assert_eq!(store.get(), Session::default());
        assert!(!store.is_authenticated());
    }

    #[test]
    fn session_survives_restart() {
        let storage = MemorySessionStorage::new();
        let store = SessionStore::load(storage.clone());
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());
        drop(store);

        let restarted = SessionStore::load(storage);
        let session = restarted.get();
        assert_eq!(session.user, Some(alice()));
        assert_eq!(session.access_token.as_deref(), Some("a1"));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn file_storage_survives_restart() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("estate").join("auth.json");

        let store = SessionStore::load(FileSessionStorage::new(&path));
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());
        assert!(path.exists());

        let restarted = SessionStore::load(FileSessionStorage::new(&path));
        assert_eq!(restarted.get(), store.get());
    }

    #[test]
    fn persisted_shape_uses_token_key() {
        let storage = MemorySessionStorage::new();
        let store = SessionStore::load(storage.clone());
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());

        let raw: serde_json::Value =
            serde_json::from_str(&storage.raw().expect("persisted")).expect("json");
        assert_eq!(raw["token"], "a1");
        assert_eq!(raw["refreshToken"], "r1");
        assert_eq!(raw["user"]["email"], "a@b.com");
    }

    #[test]
    fn set_access_token_preserves_user_and_refresh_token() {
        let storage = MemorySessionStorage::new();
        let store = SessionStore::load(storage.clone());
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());

        store.set_access_token("a2".to_string());

        let session = store.get();
        assert_eq!(session.access_token.as_deref(), Some("a2"));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(session.user, Some(alice()));

        let restarted = SessionStore::load(storage);
        assert_eq!(restarted.access_token().as_deref(), Some("a2"));
    }

    #[test]
    fn set_access_token_on_logged_out_store_is_ignored() {
        let storage = MemorySessionStorage::new();
        let store = SessionStore::load(storage.clone());
        store.set_access_token("orphan".to_string());

        assert_eq!(store.get(), Session::default());
        assert!(storage.raw().is_none());
    }

    #[test]
    fn rotate_tokens_keeps_user_and_persists() {
        let storage = MemorySessionStorage::new();
        let store = SessionStore::load(storage.clone());
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());

        assert!(store.rotate_tokens("r1", "a2".to_string(), "r2".to_string()));

        let restarted = SessionStore::load(storage);
        let session = restarted.get();
        assert_eq!(session.user, Some(alice()));
        assert_eq!(session.access_token.as_deref(), Some("a2"));
        assert_eq!(session.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn rotate_tokens_after_clear_stays_logged_out() {
        let storage = MemorySessionStorage::new();
        let store = SessionStore::load(storage.clone());
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());
        store.clear();

        assert!(!store.rotate_tokens("r1", "a2".to_string(), "r2".to_string()));
        assert_eq!(store.get(), Session::default());
        assert!(storage.raw().is_none());
    }

    #[test]
    fn rotate_tokens_ignores_a_newer_login() {
        let store = SessionStore::load(MemorySessionStorage::new());
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());
        store.set_session(Some(alice()), "b1".to_string(), "s1".to_string());

        assert!(!store.rotate_tokens("r1", "a2".to_string(), "r2".to_string()));
        assert_eq!(store.access_token().as_deref(), Some("b1"));
        assert_eq!(store.refresh_token().as_deref(), Some("s1"));
    }

    #[test]
    fn clear_removes_persisted_slot() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("auth.json");
        let store = SessionStore::load(FileSessionStorage::new(&path));
        store.set_session(Some(alice()), "a1".to_string(), "r1".to_string());

        store.clear();

        assert_eq!(store.get(), Session::default());
        assert!(!path.exists());
        // Clearing twice is harmless.
        store.clear();
    }

    #[test]
    fn corrupt_slot_means_logged_out() {
        let storage = MemorySessionStorage::new();
        storage.save("{not json").expect("save");
        let store = SessionStore::load(storage);
        assert!(!store.is_authenticated());
    }

    #[test]
    fn half_populated_slot_means_logged_out() {
        let storage = MemorySessionStorage::new();
        storage
            .save(r#"{"user":null,"token":"a1","refreshToken":null}"#)
            .expect("save");
        let store = SessionStore::load(storage);
        assert_eq!(store.get(), Session::default());
    }
}
