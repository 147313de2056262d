//! Error classification and bounded retry for refresh/auth calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::provider::AuthClientError;

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recoverability {
    /// Transient; the same call may succeed later.
    Retryable,
    /// The session cannot be salvaged; the user must sign in again.
    Terminal,
}

pub fn classify(error: &AuthClientError) -> Recoverability {
    match error {
        AuthClientError::Network(_)
        | AuthClientError::RateLimited
        | AuthClientError::Storage(_)
        | AuthClientError::Internal(_) => Recoverability::Retryable,
        AuthClientError::Upstream { status, .. } if *status >= 500 || *status == 429 => {
            Recoverability::Retryable
        }
        AuthClientError::Upstream { .. }
        | AuthClientError::InvalidGrant(_)
        | AuthClientError::RefreshTokenExpired
        | AuthClientError::NoSession
        | AuthClientError::InvalidCredentials
        | AuthClientError::EmailNotConfirmed => Recoverability::Terminal,
    }
}

/// Run `operation` up to `max_attempts` times.
///
/// Retryable failures back off exponentially from `base_delay`; the first
/// terminal failure is returned immediately. A `max_attempts` of zero is
/// treated as one.
pub async fn execute_with_recovery<T, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<T, AuthClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AuthClientError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if classify(&e) == Recoverability::Terminal => return Err(e),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = backoff(base_delay, attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Auth call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn backoff(base_delay: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
    base_delay.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Stable user-facing text for an auth failure.
pub fn error_message(error: &AuthClientError) -> &'static str {
    match error {
        AuthClientError::Network(_) => {
            "Unable to reach the authentication service. Check your connection and try again."
        }
        AuthClientError::Upstream { status, .. } if *status >= 500 => {
            "The authentication service is temporarily unavailable. Please try again."
        }
        AuthClientError::Upstream { .. } => "Authentication failed. Please sign in again.",
        AuthClientError::InvalidGrant(_) | AuthClientError::RefreshTokenExpired => {
            "Your session has expired. Please sign in again."
        }
        AuthClientError::NoSession => "You are not signed in.",
        AuthClientError::InvalidCredentials => "Invalid email or password.",
        AuthClientError::EmailNotConfirmed => {
            "Please confirm your email address before signing in."
        }
        AuthClientError::RateLimited => "Too many attempts. Please wait a moment and try again.",
        AuthClientError::Storage(_) | AuthClientError::Internal(_) => {
            "Something went wrong. Please try again."
        }
    }
}
