//! In-memory mirror of "is someone signed in, and who".
//!
//! The auth session keeps this in step with the credential store; views
//! subscribe to it to re-render when it changes.

use std::sync::Arc;

use tokio::sync::watch;

use crate::models::UserSummary;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub logged_in: bool,
    pub user: Option<UserSummary>,
}

/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct GlobalStore {
    state: Arc<watch::Sender<SessionState>>,
}

impl Default for GlobalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalStore {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn login(&self, user: UserSummary) {
        self.state.send_modify(|state| {
            state.user = Some(user);
            state.logged_in = true;
        });
    }

    pub fn logout(&self) {
        self.state.send_modify(|state| {
            state.user = None;
            state.logged_in = false;
        });
    }

    pub fn set_authenticated(&self, logged_in: bool) {
        self.state.send_modify(|state| state.logged_in = logged_in);
    }

    pub fn set_user(&self, user: Option<UserSummary>) {
        self.state.send_modify(|state| state.user = user);
    }

    /// Replace the whole state at once.
    pub fn replace(&self, next: SessionState) {
        self.state.send_replace(next);
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().logged_in
    }

    pub fn user(&self) -> Option<UserSummary> {
        self.state.borrow().user.clone()
    }

    /// Receiver that wakes on every change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserSummary {
        UserSummary {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            photo: None,
            date_joined: None,
        }
    }

    #[test]
    fn test_login_logout() {
        let store = GlobalStore::new();
        assert_eq!(store.snapshot(), SessionState::default());

        store.login(alice());
        assert!(store.is_logged_in());
        assert_eq!(store.user().map(|u| u.id), Some(1));

        store.logout();
        assert!(!store.is_logged_in());
        assert!(store.user().is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let store = GlobalStore::new();
        let view = store.clone();
        store.set_authenticated(true);
        store.set_user(Some(alice()));
        assert!(view.is_logged_in());
        assert_eq!(view.user().map(|u| u.username), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let store = GlobalStore::new();
        let mut rx = store.subscribe();
        store.login(alice());
        rx.changed().await.expect("store still alive");
        assert!(rx.borrow_and_update().logged_in);
    }
}
