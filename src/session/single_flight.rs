//! Single-flight refresh keyed by refresh token.
//!
//! Refresh tokens rotate: once a refresh succeeds, the token it consumed is
//! dead. Two concurrent requests carrying the same token would otherwise
//! race, and the loser would see `invalid_grant` and sign the user out. All
//! callers presenting the same token within the window share one upstream
//! call and its result.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::Session;
use super::recovery::{Recoverability, classify};
use crate::provider::{AuthClient, AuthClientError};

/// How long a completed refresh is served to late duplicates.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5);

type SharedRefresh = Shared<BoxFuture<'static, Result<Session, AuthClientError>>>;

/// Written by the upstream task when it finishes, whether or not anyone is
/// still awaiting the result.
#[derive(Debug, Clone, Copy)]
struct Completion {
    at: Instant,
    /// Successes and terminal failures; retryable failures are not served again
    reusable: bool,
}

type CompletionSlot = Arc<Mutex<Option<Completion>>>;

struct Flight {
    completion: CompletionSlot,
    result: SharedRefresh,
}

impl Flight {
    fn is_reusable(&self, now: Instant, window: Duration) -> bool {
        match *self.completion.lock() {
            None => true,
            Some(done) => done.reusable && now.duration_since(done.at) < window,
        }
    }
}

/// Records the completion on drop, so a panicking refresh is evicted too.
struct CompletionGuard {
    slot: CompletionSlot,
    reusable: bool,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        *self.slot.lock() = Some(Completion {
            at: Instant::now(),
            reusable: self.reusable,
        });
    }
}

pub struct RefreshDeduplicator {
    window: Duration,
    flights: Mutex<HashMap<String, Flight>>,
}

impl RefreshDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh `refresh_token`, joining an in-flight or recent refresh of the
    /// same token if there is one.
    ///
    /// The upstream call runs on its own task, so a caller that goes away
    /// does not stall the others.
    pub async fn refresh<C: AuthClient>(
        &self,
        client: &Arc<C>,
        refresh_token: &str,
    ) -> Result<Session, AuthClientError> {
        let shared = {
            let mut flights = self.flights.lock();
            let now = Instant::now();
            flights.retain(|_, flight| flight.is_reusable(now, self.window));

            match flights.get(refresh_token) {
                Some(flight) => {
                    debug!("Joining in-flight refresh");
                    flight.result.clone()
                }
                None => {
                    let completion = CompletionSlot::default();
                    let result = spawn_refresh(
                        Arc::clone(client),
                        refresh_token.to_string(),
                        completion.clone(),
                    );
                    flights.insert(
                        refresh_token.to_string(),
                        Flight {
                            completion,
                            result: result.clone(),
                        },
                    );
                    result
                }
            }
        };

        shared.await
    }

    /// Number of tracked refreshes (in flight or cached).
    pub fn tracked(&self) -> usize {
        self.flights.lock().len()
    }
}

impl Default for RefreshDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW)
    }
}

fn spawn_refresh<C: AuthClient>(
    client: Arc<C>,
    refresh_token: String,
    completion: CompletionSlot,
) -> SharedRefresh {
    let task = tokio::spawn(async move {
        let mut guard = CompletionGuard {
            slot: completion,
            reusable: false,
        };
        let result = client.refresh_session(&refresh_token).await;
        guard.reusable = match &result {
            Ok(_) => true,
            Err(e) => classify(e) == Recoverability::Terminal,
        };
        result
    });
    async move {
        task.await
            .unwrap_or_else(|e| Err(AuthClientError::Internal(format!("refresh task failed: {e}"))))
    }
    .boxed()
    .shared()
}
