use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::CredentialStore;
use crate::api::ApiError;

/// Unauthenticated entry point the user is sent to on logout
pub const LOGIN_ROUTE: &str = "/login";

/// Events emitted at the navigation boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedOut { redirect_to: String },
}

/// Hands control to whatever owns navigation (a router, a UI loop, a CLI).
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that does nothing, for headless use.
pub struct NoNavigation;

impl Navigator for NoNavigation {
    fn navigate(&self, _route: &str) {}
}

impl Navigator for mpsc::UnboundedSender<SessionEvent> {
    fn navigate(&self, route: &str) {
        let event = SessionEvent::LoggedOut {
            redirect_to: route.to_string(),
        };
        if self.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

/// Clears the session and redirects to the login boundary.
#[derive(Clone)]
pub struct SessionTeardown {
    store: Arc<CredentialStore>,
    navigator: Arc<dyn Navigator>,
}

impl SessionTeardown {
    pub fn new(store: Arc<CredentialStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self { store, navigator }
    }

    /// Clear both tokens and redirect. Calling this on an empty store does
    /// nothing.
    ///
    /// The redirect happens whenever a session was present, even if the
    /// backend then fails to remove it; that failure is still returned.
    pub fn logout(&self) -> Result<(), ApiError> {
        let had_session = self.store.is_authenticated();
        let cleared = self.store.clear();

        if let Err(ref e) = cleared {
            error!(error = %e, "Failed to remove stored credential");
        }
        if had_session || matches!(cleared, Ok(true)) {
            warn!(redirect_to = LOGIN_ROUTE, "Session cleared");
            self.navigator.navigate(LOGIN_ROUTE);
        }
        cleared.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, MemoryStorage, StorageBackend};

    struct ReadOnlyStorage(MemoryStorage);

    impl StorageBackend for ReadOnlyStorage {
        fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.0.get(key)
        }

        fn set_many(&self, entries: &[(&str, &str)]) -> anyhow::Result<()> {
            self.0.set_many(entries)
        }

        fn remove_many(&self, _keys: &[&str]) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn test_logout_clears_and_redirects_once() {
        let store = CredentialStore::shared(Box::new(MemoryStorage::new())).unwrap();
        store.replace(Credential::new("A1", "R1")).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let teardown = SessionTeardown::new(Arc::clone(&store), Arc::new(tx));

        teardown.logout().unwrap();
        assert!(!store.is_authenticated());
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::LoggedOut {
                redirect_to: LOGIN_ROUTE.to_string()
            }
        );

        teardown.logout().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_logout_redirects_even_when_storage_fails() {
        let backing = MemoryStorage::new();
        backing
            .set_many(&[("accessToken", "A1"), ("refreshToken", "R1")])
            .unwrap();
        let store = CredentialStore::shared(Box::new(ReadOnlyStorage(backing))).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let teardown = SessionTeardown::new(Arc::clone(&store), Arc::new(tx));

        assert!(matches!(teardown.logout(), Err(ApiError::Storage(_))));
        assert!(rx.try_recv().is_ok());

        // Memory still matches the backend, so a retry redirects again
        assert!(store.is_authenticated());
        assert!(teardown.logout().is_err());
        assert!(rx.try_recv().is_ok());
    }
}
