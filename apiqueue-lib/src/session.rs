use std::fmt::Debug;
use std::sync::{PoisonError, RwLock};

use secrecy::{ExposeSecret, SecretString};

/// Source of the session id attached to every request.
///
/// Acquiring a session (request token, login) is up to the application;
/// the client only asks for the current one right before sending.
pub trait SessionProvider: Debug + Send + Sync {
    /// The active session id, or `None` if there is no session
    fn current_session_id(&self) -> Option<SecretString>;
}

/// A [`SessionProvider`] whose session id can be set and cleared at runtime
#[derive(Debug, Default)]
pub struct SessionStore {
    session_id: RwLock<Option<SecretString>>,
}

impl SessionStore {
    /// Create a store without an active session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with an active session
    #[must_use]
    pub fn with_session_id(session_id: SecretString) -> Self {
        Self {
            session_id: RwLock::new(Some(session_id)),
        }
    }

    /// Start a session, replacing the previous one
    pub fn set_session_id(&self, session_id: SecretString) {
        *self
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session_id);
    }

    /// End the current session
    pub fn clear(&self) {
        *self
            .session_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns `true` if a session is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl SessionProvider for SessionStore {
    fn current_session_id(&self) -> Option<SecretString> {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|id| SecretString::from(id.expose_secret().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let store = SessionStore::new();
        assert!(!store.is_active());
        assert!(store.current_session_id().is_none());

        store.set_session_id(SecretString::from("abc".to_string()));
        assert!(store.is_active());
        assert_eq!(
            store.current_session_id().unwrap().expose_secret(),
            "abc"
        );

        store.clear();
        assert!(store.current_session_id().is_none());
    }

    #[test]
    fn test_session_id_is_redacted() {
        let store = SessionStore::with_session_id(SecretString::from("secret-session".to_string()));
        assert!(!format!("{store:?}").contains("secret-session"));
    }
}
