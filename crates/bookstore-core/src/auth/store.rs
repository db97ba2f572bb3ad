use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::kv::{FileStore, KeyValueStore, MemoryStore, StoreError};
use crate::models::UserIdentity;

/// Key holding the serialized identity JSON
pub const USER_KEY: &str = "user";

/// Key holding the raw token
pub const TOKEN_KEY: &str = "token";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated,
}

/// Identity and token as one value.
///
/// An identity is only ever held together with a token; constructing a
/// state with an identity but no token drops the identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    identity: Option<UserIdentity>,
    token: Option<String>,
}

impl SessionState {
    pub fn new(identity: Option<UserIdentity>, token: Option<String>) -> Self {
        let token = token.filter(|t| !t.is_empty());
        let identity = if token.is_some() { identity } else { None };
        Self { identity, token }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn auth_state(&self) -> AuthState {
        if self.token.is_some() {
            AuthState::Authenticated
        } else {
            AuthState::Anonymous
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_state() == AuthState::Authenticated
    }
}

/// Persists the session under the `user` and `token` keys.
///
/// Reads never fail: unreadable storage or an identity that is not a JSON
/// object degrade to an absent value. Writes surface storage errors.
pub struct SessionStore {
    backend: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// File-backed store at `<dir>/session.json`.
    pub fn open(dir: &Path) -> Self {
        Self::new(Arc::new(FileStore::new(dir.join(SESSION_FILE))))
    }

    pub fn load(&self) -> SessionState {
        self.load_checked().0
    }

    /// `load`, also reporting whether a stored identity had to be dropped
    /// because it could not be read.
    pub fn load_checked(&self) -> (SessionState, bool) {
        let (raw_user, token) = match self.backend.get_many(&[USER_KEY, TOKEN_KEY]) {
            Ok(mut values) => {
                let token = values.pop().flatten();
                let user = values.pop().flatten();
                (user, token)
            }
            Err(e) => {
                warn!(error = %e, "Failed to read session storage, treating as signed out");
                return (SessionState::anonymous(), false);
            }
        };

        let mut corrupted = false;
        let identity = raw_user.and_then(|raw| match serde_json::from_str::<UserIdentity>(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "Stored identity is not a JSON object, ignoring it");
                corrupted = true;
                None
            }
        });

        (SessionState::new(identity, token), corrupted)
    }

    /// Current token, if any.
    pub fn token(&self) -> Option<String> {
        self.load().token
    }

    /// Store a new session, replacing whatever was there.
    ///
    /// A `None` identity removes any previously stored identity in the same
    /// batch as the token write.
    pub fn save(&self, identity: Option<&UserIdentity>, token: &str) -> Result<(), StoreError> {
        let user_json = identity.map(serde_json::to_string).transpose()?;
        self.backend.write_batch(&[
            (USER_KEY, user_json.as_deref()),
            (TOKEN_KEY, Some(token)),
        ])?;
        debug!(has_identity = identity.is_some(), "Session saved");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove_many(&[USER_KEY, TOKEN_KEY])?;
        debug!("Session cleared");
        Ok(())
    }

    /// Clear the session only if it still holds `token`.
    ///
    /// Returns `false`, leaving the store untouched, when another session
    /// has replaced it in the meantime.
    pub fn clear_if_token(&self, token: &str) -> Result<bool, StoreError> {
        let cleared = self
            .backend
            .remove_many_if(TOKEN_KEY, token, &[USER_KEY, TOKEN_KEY])?;
        debug!(cleared, "Conditional session clear");
        Ok(cleared)
    }
}
