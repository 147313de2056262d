//! Timer-driven session refresher for one client runtime.
//!
//! The scheduler owns no session of its own. It reads the shared
//! [`TokenStore`], asks [`decide`] whether a refresh is due, and writes the
//! outcome back to the store and the cookie jar.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::jar::ClientCookieJar;
use crate::provider::{AuthClient, AuthClientError, AuthStateChange};
use crate::session::{
    CookieRead, CookieSynchronizer, Recoverability, Session, TokenStore, classify, decide,
    error_message, execute_with_recovery, unix_now,
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Period between policy evaluations
    pub interval: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10 * 60),
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Refreshing,
}

/// What a single policy evaluation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Disposed,
    NotNeeded,
    /// A refresh was due but one is already running.
    InFlight,
    Started,
}

pub struct RefreshScheduler<C: AuthClient> {
    inner: Arc<Inner<C>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Inner<C> {
    client: Arc<C>,
    store: Arc<TokenStore>,
    jar: Arc<dyn ClientCookieJar>,
    cookies: CookieSynchronizer,
    config: SchedulerConfig,
    refreshing: AtomicBool,
    alive: CancellationToken,
    /// Held while a result is written back; `dispose` takes it too.
    apply: Mutex<()>,
    last_error: Mutex<Option<AuthClientError>>,
}

impl<C: AuthClient> RefreshScheduler<C> {
    pub fn new(
        client: Arc<C>,
        store: Arc<TokenStore>,
        jar: Arc<dyn ClientCookieJar>,
        cookies: CookieSynchronizer,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                jar,
                cookies,
                config,
                refreshing: AtomicBool::new(false),
                alive: CancellationToken::new(),
                apply: Mutex::new(()),
                last_error: Mutex::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Mount: seed the store, then start the timer and the auth-state listener.
    ///
    /// The first timer tick fires immediately, so a session that is already
    /// near expiry is refreshed right away. Calling `init` twice is a no-op.
    pub async fn init(&self) {
        if self.inner.alive.is_cancelled() || self.task.lock().is_some() {
            return;
        }

        self.inner.seed().await;

        // Subscribe before spawning so no change is missed in between
        let changes = self.inner.client.on_auth_state_change();
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run(changes).await });

        let mut task = self.task.lock();
        if self.inner.alive.is_cancelled() {
            handle.abort();
        } else {
            *task = Some(handle);
        }
        info!("Refresh scheduler started");
    }

    /// Unmount: stop the timer and listener. A refresh still in flight
    /// finishes, but its result is dropped.
    pub fn dispose(&self) {
        {
            let _guard = self.inner.apply.lock();
            if self.inner.alive.is_cancelled() {
                return;
            }
            self.inner.alive.cancel();
        }
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.inner.store.set_loading(false);
        info!("Refresh scheduler disposed");
    }

    /// Evaluate the refresh policy now, outside the timer. Must be called
    /// from within a tokio runtime.
    pub fn tick(&self) -> TickOutcome {
        self.inner.evaluate()
    }

    pub fn phase(&self) -> SchedulerPhase {
        if self.inner.refreshing.load(Ordering::Acquire) {
            SchedulerPhase::Refreshing
        } else {
            SchedulerPhase::Idle
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.alive.is_cancelled()
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    /// Error from the most recent refresh, cleared by a successful one.
    pub fn last_error(&self) -> Option<AuthClientError> {
        self.inner.last_error.lock().clone()
    }

    /// User-facing text for [`last_error`](Self::last_error).
    pub fn last_error_message(&self) -> Option<&'static str> {
        self.inner.last_error.lock().as_ref().map(error_message)
    }
}

impl<C: AuthClient> Drop for RefreshScheduler<C> {
    fn drop(&mut self) {
        self.inner.alive.cancel();
    }
}

impl<C: AuthClient> Inner<C> {
    async fn seed(&self) {
        let records = self.jar.records();
        self.jar.apply(&self.cookies.purge_legacy(&records));

        if self.store.get().is_some() {
            return;
        }

        match self.cookies.read(&records) {
            CookieRead::Present(session) => {
                debug!(user_id = %session.user_id, "Seeded session from cookies");
                self.store.set(session);
                return;
            }
            CookieRead::Corrupt(reason) => {
                warn!(%reason, "Discarding corrupt session cookies");
                self.jar.apply(&self.cookies.purge(&records));
            }
            CookieRead::Absent => {}
        }

        match self.client.get_session().await {
            Ok(Some(session)) => {
                let _guard = self.apply.lock();
                if self.alive.is_cancelled() {
                    return;
                }
                debug!(user_id = %session.user_id, "Seeded session from identity provider");
                if self.store.set(session.clone()) {
                    self.jar.apply(&self.cookies.write(&session, unix_now()));
                }
            }
            Ok(None) => debug!("No session to seed"),
            Err(e) => {
                warn!(error = %e, "Failed to load session from identity provider");
                *self.last_error.lock() = Some(e);
            }
        }
    }

    async fn run(self: Arc<Self>, mut changes: broadcast::Receiver<AuthStateChange>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut listening = true;

        loop {
            tokio::select! {
                _ = self.alive.cancelled() => break,
                _ = ticker.tick() => {
                    self.evaluate();
                }
                change = changes.recv(), if listening => match change {
                    Ok(change) => self.apply_change(change),
                    // The newest changes are retained and each carries the
                    // full resulting session, so skipped ones are superseded
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth state listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Auth state channel closed");
                        listening = false;
                    }
                },
            }
        }
    }

    fn evaluate(self: &Arc<Self>) -> TickOutcome {
        if self.alive.is_cancelled() {
            return TickOutcome::Disposed;
        }

        let session = self.store.get();
        let decision = decide(session.as_ref(), unix_now());
        let Some(session) = session.filter(|_| decision.must_refresh) else {
            return TickOutcome::NotNeeded;
        };

        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Refresh already in flight");
            return TickOutcome::InFlight;
        }

        debug!(reason = ?decision.reason, user_id = %session.user_id, "Refreshing session");
        self.store.set_loading(true);
        tokio::spawn(self.clone().run_refresh(session.refresh_token));
        TickOutcome::Started
    }

    async fn run_refresh(self: Arc<Self>, refresh_token: String) {
        let client = self.client.clone();
        let result = execute_with_recovery(
            || {
                let client = client.clone();
                let token = refresh_token.clone();
                async move { client.refresh_session(&token).await }
            },
            self.config.max_attempts,
            self.config.base_delay,
        )
        .await;

        {
            let _guard = self.apply.lock();
            if self.alive.is_cancelled() {
                debug!("Scheduler disposed, discarding refresh result");
            } else {
                self.apply_result(result, &refresh_token);
                self.store.set_loading(false);
            }
        }
        self.refreshing.store(false, Ordering::Release);
    }

    /// Write back the outcome of refreshing `refresh_token`.
    ///
    /// A terminal failure only signs out if the store still holds the session
    /// that token belongs to; a newer session from an auth-state change wins.
    fn apply_result(&self, result: Result<Session, AuthClientError>, refresh_token: &str) {
        match result {
            Ok(session) => {
                if self.store.set(session.clone()) {
                    self.jar.apply(&self.cookies.write(&session, unix_now()));
                }
                info!(user_id = %session.user_id, expires_at = session.expires_at, "Session refreshed");
                *self.last_error.lock() = None;
            }
            Err(e) => {
                match classify(&e) {
                    Recoverability::Retryable => {
                        warn!(error = %e, "Refresh failed, keeping current session");
                    }
                    Recoverability::Terminal => {
                        let current = self.store.get();
                        if current.is_some_and(|s| s.refresh_token == refresh_token) {
                            warn!(error = %e, "Refresh rejected, signing out");
                            self.store.clear();
                            self.jar.apply(&self.cookies.clear());
                        } else {
                            debug!(error = %e, "Refresh rejected for a superseded session");
                        }
                    }
                }
                *self.last_error.lock() = Some(e);
            }
        }
    }

    fn apply_change(&self, change: AuthStateChange) {
        let _guard = self.apply.lock();
        if self.alive.is_cancelled() {
            return;
        }

        debug!(event = ?change.event, "Auth state changed");
        match change.session {
            Some(session) => {
                self.jar.apply(&self.cookies.write(&session, unix_now()));
                self.store.replace(Some(session));
            }
            None => {
                self.store.replace(None);
                self.jar.apply(&self.cookies.clear());
            }
        }
        self.store.set_loading(false);
    }
}
