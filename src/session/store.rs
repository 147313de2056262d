//! Token store: the one current session of a runtime.
//!
//! On the client this lives as long as the scheduler that owns it; on the
//! server one is built per request from cookies and dropped with the request.

use tokio::sync::watch;
use tracing::debug;

use super::{AuthState, Session};

pub struct TokenStore {
    state: watch::Sender<AuthState>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self {
            state: watch::Sender::new(AuthState::default()),
        }
    }

    pub fn with_session(session: Session) -> Self {
        let store = Self::new();
        store.replace(Some(session));
        store
    }

    pub fn get(&self) -> Option<Session> {
        self.state.borrow().session().cloned()
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Watch for changes to the auth state.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Install `session` unless the store already holds a longer-lived one.
    ///
    /// Setting an identical session is a no-op. Returns whether the stored
    /// session changed.
    pub fn set(&self, session: Session) -> bool {
        self.state.send_if_modified(|state| match state.session() {
            Some(current) if *current == session => false,
            Some(current) if session.expires_at < current.expires_at => {
                debug!(
                    current_expires_at = current.expires_at,
                    incoming_expires_at = session.expires_at,
                    "Ignoring older session"
                );
                false
            }
            _ => {
                state.put_session(Some(session));
                true
            }
        })
    }

    /// Replace the stored session regardless of expiry ordering.
    ///
    /// Used for externally observed sign-in/sign-out events, which may
    /// legitimately move to a shorter-lived session or to none.
    pub fn replace(&self, session: Option<Session>) {
        self.state.send_if_modified(|state| {
            if state.session() == session.as_ref() {
                return false;
            }
            state.put_session(session);
            true
        });
    }

    pub fn clear(&self) {
        self.replace(None);
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            if state.is_loading() == loading {
                return false;
            }
            state.put_loading(loading);
            true
        });
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}
