//! Session value types and the pieces that keep one session consistent.
//!
//! - [`policy`]: pure refresh decision
//! - [`store`]: per-runtime token store
//! - [`cookie`]: cookie wire format
//! - [`recovery`]: error classification and bounded retry
//! - [`single_flight`]: server-side refresh deduplication

pub mod cookie;
pub mod policy;
pub mod recovery;
pub mod single_flight;
pub mod store;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use cookie::{
    ACCESS_COOKIE_NAME, CookieRead, CookieRecord, CookieSettings, CookieSynchronizer,
    CorruptCookie, REFRESH_COOKIE_NAME,
};
pub use policy::{REFRESH_THRESHOLD_SECS, RefreshDecision, RefreshReason, decide};
pub use recovery::{Recoverability, classify, error_message, execute_with_recovery};
pub use single_flight::RefreshDeduplicator;
pub use store::TokenStore;

/// One authenticated principal: token pair, identity, and expiry.
///
/// A session is never edited in place. Refresh produces a new value that
/// replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
    pub user_email: String,
    /// Access token expiry (Unix seconds)
    pub expires_at: i64,
}

impl Session {
    pub fn user(&self) -> UserIdentity {
        UserIdentity {
            id: self.user_id.clone(),
            email: self.user_email.clone(),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Seconds until expiry, clamped at zero.
    pub fn expires_in(&self, now: i64) -> i64 {
        self.expires_at.saturating_sub(now).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
}

/// Client-side view of the session.
///
/// `user` is derived from `session` on every write, so one is present
/// exactly when the other is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    session: Option<Session>,
    user: Option<UserIdentity>,
    is_loading: bool,
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&UserIdentity> {
        self.user.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub(crate) fn put_session(&mut self, session: Option<Session>) {
        self.user = session.as_ref().map(Session::user);
        self.session = session;
    }

    pub(crate) fn put_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
