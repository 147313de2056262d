//! Identity provider interface.
//!
//! The coordinator never issues sessions itself; it asks an [`AuthClient`]
//! to refresh, revoke and verify them. [`LocalAuthClient`] is the bundled
//! implementation backed by HS256 JWTs and a SQLite refresh-token table.

mod local;

use std::future::Future;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::session::Session;

pub use local::{
    AccessClaims, DEFAULT_ACCESS_TTL_SECS, LocalAuthClient, REFRESH_TOKEN_TTL_SECS, RefreshClaims,
    TokenType,
};

/// Kind of externally observed auth-state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// An auth-state change together with the session it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

/// Failures reported by an identity provider.
///
/// Messages carried here are for logs only; user-facing text comes from
/// [`crate::session::error_message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("identity provider returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("no session")]
    NoSession,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email not confirmed")]
    EmailNotConfirmed,
    #[error("rate limited")]
    RateLimited,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Operations the coordinator consumes from an identity provider.
///
/// Implementations must be cheap to share behind an `Arc`.
pub trait AuthClient: Send + Sync + 'static {
    /// The session the provider currently holds for this runtime, if any.
    fn get_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, AuthClientError>> + Send;

    /// Exchange `refresh_token` for a new session.
    fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<Session, AuthClientError>> + Send;

    /// Revoke the session identified by `refresh_token`.
    fn sign_out(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<(), AuthClientError>> + Send;

    /// Subscribe to auth-state changes. Dropping the receiver unsubscribes.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange>;

    /// Check the access token's signature. Expiry is not checked here.
    fn verify_access_token(&self, access_token: &str) -> Result<(), AuthClientError>;
}
