//! Axum extractors over the interceptor's [`RequestSession`].

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::interceptor::{RequestSession, SessionStatus};
use crate::session::{Session, unix_now};

/// The request's session, possibly anonymous. Never rejects.
///
/// Without the interceptor installed every request looks anonymous.
pub struct CurrentSession(pub RequestSession);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<RequestSession>()
            .cloned()
            .unwrap_or_else(|| RequestSession::anonymous(unix_now()));
        Ok(CurrentSession(session))
    }
}

/// A session usable for this request, or a 401.
///
/// Applies the same rule as protected routes: reads accept a session that
/// could not be renewed, writes need an unexpired one.
pub struct ValidSession {
    pub session: Session,
    pub status: SessionStatus,
}

impl<S> FromRequestParts<S> for ValidSession
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let request_session = parts
            .extensions
            .get::<RequestSession>()
            .ok_or(AuthErrorKind::NotAuthenticated)?;

        let session = request_session.permits(&parts.method, unix_now())?;
        Ok(ValidSession {
            session: session.clone(),
            status: request_session.status,
        })
    }
}
