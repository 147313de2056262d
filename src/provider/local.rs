//! Bundled identity provider: HS256 JWTs with database-tracked refresh tokens.
//!
//! - Access tokens are stateless; their `exp` is the session expiry.
//! - Refresh tokens carry a JTI tracked in `refresh_tokens`. Each refresh
//!   rotates the JTI, so a refresh token works exactly once.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::{AuthClient, AuthClientError, AuthEvent, AuthStateChange};
use crate::db::Database;
use crate::session::{Session, unix_now};

/// Access token lifetime: 1 hour
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 60 * 60;

/// Refresh token lifetime: 2 weeks
pub const REFRESH_TOKEN_TTL_SECS: i64 = 14 * 24 * 60 * 60;

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user id)
    pub sub: String,
    pub email: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID (tracked for rotation and revocation)
    pub jti: String,
    pub sub: String,
    pub email: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

/// Server-side provider shared by every user of one process.
///
/// Its auth-state stream is server-wide: refreshes and sign-outs of all users
/// arrive on the same channel, and a sign-out carries no session. It is
/// meant for server-side observers such as audit logging, not for driving a
/// single user's `RefreshScheduler`, which applies every change it receives.
pub struct LocalAuthClient {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    db: Database,
    access_ttl: i64,
    events: broadcast::Sender<AuthStateChange>,
}

impl LocalAuthClient {
    pub fn new(secret: &[u8], db: Database) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            db,
            access_ttl: DEFAULT_ACCESS_TTL_SECS,
            events,
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, secs: i64) -> Self {
        self.access_ttl = secs;
        self
    }

    /// Start a session for an already-authenticated user.
    ///
    /// Credential checks happen before this call and are not part of this
    /// crate; this is the seeding hook for development and tests.
    pub async fn issue_session(
        &self,
        user_id: &str,
        email: &str,
    ) -> Result<Session, AuthClientError> {
        self.issue_session_expiring_in(user_id, email, self.access_ttl)
            .await
    }

    /// Like [`issue_session`](Self::issue_session) with an explicit access token lifetime.
    pub async fn issue_session_expiring_in(
        &self,
        user_id: &str,
        email: &str,
        access_ttl: i64,
    ) -> Result<Session, AuthClientError> {
        let now = unix_now();
        let (session, refresh) = self.mint(user_id, email, now, access_ttl)?;

        self.db
            .refresh_tokens()
            .create(&refresh.jti, user_id, refresh.iat, refresh.exp)
            .await
            .map_err(storage_error)?;
        self.db
            .profiles()
            .upsert(user_id, email, None)
            .await
            .map_err(storage_error)?;

        info!(user_id, "Session issued");
        self.emit(AuthEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Validate a refresh token's signature, type and expiry.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, AuthClientError> {
        self.decode_refresh_token(token, true)
    }

    /// Decode an access token, optionally enforcing expiry.
    pub fn decode_access_token(
        &self,
        token: &str,
        check_exp: bool,
    ) -> Result<AccessClaims, AuthClientError> {
        let claims = jsonwebtoken::decode::<AccessClaims>(
            token,
            &self.decoding_key,
            &validation(check_exp),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthClientError::InvalidGrant("access token expired".into()),
            _ => AuthClientError::InvalidGrant("invalid access token".into()),
        })?
        .claims;

        if claims.token_type != TokenType::Access {
            return Err(AuthClientError::InvalidGrant("wrong token type".into()));
        }
        Ok(claims)
    }

    fn decode_refresh_token(
        &self,
        token: &str,
        check_exp: bool,
    ) -> Result<RefreshClaims, AuthClientError> {
        let claims = jsonwebtoken::decode::<RefreshClaims>(
            token,
            &self.decoding_key,
            &validation(check_exp),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthClientError::RefreshTokenExpired,
            _ => AuthClientError::InvalidGrant("invalid refresh token".into()),
        })?
        .claims;

        if claims.token_type != TokenType::Refresh {
            return Err(AuthClientError::InvalidGrant("wrong token type".into()));
        }
        Ok(claims)
    }

    fn mint(
        &self,
        user_id: &str,
        email: &str,
        now: i64,
        access_ttl: i64,
    ) -> Result<(Session, RefreshClaims), AuthClientError> {
        let access = AccessClaims {
            sub: user_id.to_string(),
            email: email.to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp: now + access_ttl,
        };
        let refresh = RefreshClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user_id.to_string(),
            email: email.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + REFRESH_TOKEN_TTL_SECS,
        };

        let access_token = jsonwebtoken::encode(&Header::default(), &access, &self.encoding_key)
            .map_err(|e| AuthClientError::Internal(format!("failed to encode access token: {e}")))?;
        let refresh_token = jsonwebtoken::encode(&Header::default(), &refresh, &self.encoding_key)
            .map_err(|e| AuthClientError::Internal(format!("failed to encode refresh token: {e}")))?;

        let session = Session {
            access_token,
            refresh_token,
            user_id: user_id.to_string(),
            user_email: email.to_string(),
            expires_at: access.exp,
        };
        Ok((session, refresh))
    }

    fn emit(&self, event: AuthEvent, session: Option<Session>) {
        // No subscribers is fine
        let _ = self.events.send(AuthStateChange { event, session });
    }
}

impl AuthClient for LocalAuthClient {
    /// Always `None`: the local provider serves many runtimes and holds no
    /// "current" session of its own.
    async fn get_session(&self) -> Result<Option<Session>, AuthClientError> {
        Ok(None)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, AuthClientError> {
        let claims = self.validate_refresh_token(refresh_token)?;
        let (session, next) = self.mint(&claims.sub, &claims.email, unix_now(), self.access_ttl)?;

        let rotated = self
            .db
            .refresh_tokens()
            .rotate(&claims.jti, &next.jti, &claims.sub, next.iat, next.exp)
            .await
            .map_err(storage_error)?;
        if !rotated {
            warn!(user_id = %claims.sub, "Refresh token reuse rejected");
            return Err(AuthClientError::InvalidGrant(
                "refresh token already used or revoked".into(),
            ));
        }

        info!(user_id = %claims.sub, expires_at = session.expires_at, "Session refreshed");
        self.emit(AuthEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, refresh_token: &str) -> Result<(), AuthClientError> {
        let claims = self.decode_refresh_token(refresh_token, false)?;
        let revoked = self
            .db
            .refresh_tokens()
            .delete_by_jti(&claims.jti)
            .await
            .map_err(storage_error)?;

        debug!(user_id = %claims.sub, revoked, "Signed out");
        self.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    /// Changes for every user of this provider, not one user's session.
    fn on_auth_state_change(&self) -> broadcast::Receiver<AuthStateChange> {
        self.events.subscribe()
    }

    fn verify_access_token(&self, access_token: &str) -> Result<(), AuthClientError> {
        self.decode_access_token(access_token, false).map(|_| ())
    }
}

fn validation(check_exp: bool) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = check_exp;
    validation
}

fn storage_error(e: sqlx::Error) -> AuthClientError {
    AuthClientError::Storage(e.to_string())
}
