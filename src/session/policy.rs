//! Refresh decision shared by the client scheduler and the server interceptor.

use serde::Serialize;

use super::Session;

/// Proactive refresh window: 30 minutes before expiry.
pub const REFRESH_THRESHOLD_SECS: i64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    Expired,
    NearExpiry,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshDecision {
    pub must_refresh: bool,
    pub reason: RefreshReason,
}

impl RefreshDecision {
    const KEEP: Self = Self {
        must_refresh: false,
        reason: RefreshReason::None,
    };
}

/// Decide whether `session` must be refreshed at `now` (Unix seconds).
///
/// Refreshes exactly when `now >= expires_at - REFRESH_THRESHOLD_SECS`.
pub fn decide(session: Option<&Session>, now: i64) -> RefreshDecision {
    let Some(session) = session else {
        return RefreshDecision::KEEP;
    };

    if now >= session.expires_at {
        return RefreshDecision {
            must_refresh: true,
            reason: RefreshReason::Expired,
        };
    }

    if session.expires_at.saturating_sub(now) <= REFRESH_THRESHOLD_SECS {
        return RefreshDecision {
            must_refresh: true,
            reason: RefreshReason::NearExpiry,
        };
    }

    RefreshDecision::KEEP
}
