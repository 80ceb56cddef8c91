// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh coordinator: single-flight credential refresh with a FIFO waiter queue.
//!
//! Every caller whose request failed with credential expiry asks the
//! coordinator for a fresh access credential. The first one flips the state
//! to `Refreshing` and starts an episode; everyone arriving while the episode
//! runs is queued behind it. When the episode ends the state returns to
//! `Idle` and each waiter is resolved exactly once with the shared outcome.
//!
//! The episode runs in its own task, so a caller that gives up waiting cannot
//! leave the coordinator stuck in `Refreshing`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::RefreshFailure;
use crate::events::{EstablishedBy, InvalidationReason, SessionEvent, SessionSignals};
use crate::session::teardown::{Invalidation, Teardown};
use crate::session::{Session, SessionStore, TokenGrant};

/// Exchanges a refresh credential for new credentials.
///
/// Must not route through the request pipeline, or a rejected refresh could
/// itself trigger a refresh. Object-safe for use as `Arc<dyn TokenRefresher>`.
pub trait TokenRefresher: Send + Sync + 'static {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshFailure>> + Send + 'a>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

type Outcome = Result<String, RefreshFailure>;

struct Inner {
    state: RefreshState,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
}

pub struct RefreshCoordinator {
    /// State flag and waiter queue change together, under one lock.
    inner: Mutex<Inner>,
    refresher: Arc<dyn TokenRefresher>,
    store: Arc<SessionStore>,
    teardown: Teardown,
    signals: SessionSignals,
    timeout: Duration,
    refresh_calls: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        refresher: Arc<dyn TokenRefresher>,
        store: Arc<SessionStore>,
        teardown: Teardown,
        signals: SessionSignals,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner { state: RefreshState::Idle, waiters: VecDeque::new() }),
            refresher,
            store,
            teardown,
            signals,
            timeout,
            refresh_calls: AtomicU64::new(0),
        })
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().state
    }

    /// Callers currently waiting on the in-flight episode.
    pub fn pending(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Number of refresh calls issued to the remote so far.
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    /// Wait for an access credential newer than `failed_with`.
    ///
    /// `failed_with` is the credential the rejected request carried. If the
    /// store already holds a different one (an episode finished since the
    /// request was sent), it is returned without starting a new episode.
    pub async fn recover(self: &Arc<Self>, failed_with: Option<&str>) -> Result<String, RefreshFailure> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut inner = self.inner.lock();
            match inner.state {
                RefreshState::Refreshing => {
                    inner.waiters.push_back(tx);
                    debug!(waiters = inner.waiters.len(), "refresh in flight, queued");
                    false
                }
                RefreshState::Idle => {
                    if let Some(current) = self.store.access_token() {
                        if failed_with != Some(current.as_str()) {
                            debug!("credential renewed since request was sent, reusing it");
                            return Ok(current);
                        }
                    }
                    inner.state = RefreshState::Refreshing;
                    inner.waiters.push_back(tx);
                    true
                }
            }
        };

        if start {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.run_episode().await;
            });
        }

        rx.await.unwrap_or(Err(RefreshFailure::Abandoned))
    }

    async fn run_episode(&self) {
        let episode = Episode { coordinator: self, released: false };
        // The session this episode refreshes; teardown on failure is scoped to it.
        let session = self.store.get();

        let outcome = match self.exchange(session.as_ref()).await {
            Ok(access_token) => {
                info!("credential refreshed");
                Ok(access_token)
            }
            Err(failure) => Err(self.fail(session.as_ref(), failure)),
        };

        episode.release(outcome);
    }

    async fn exchange(&self, session: Option<&Session>) -> Outcome {
        let Some(refresh_token) = session.and_then(|s| s.refresh_token.clone()) else {
            return Err(RefreshFailure::MissingRefreshCredential);
        };

        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        let grant =
            match tokio::time::timeout(self.timeout, self.refresher.refresh(&refresh_token)).await {
                Ok(result) => result?,
                Err(_) => return Err(RefreshFailure::TimedOut(self.timeout)),
            };

        let access_token = grant.access_token.clone();
        if !self.store.apply_grant(&refresh_token, grant) {
            return Err(RefreshFailure::SessionEnded);
        }
        if let Some(identity) = self.store.identity() {
            self.signals
                .emit(SessionEvent::Established { email: identity.email, by: EstablishedBy::Refresh });
        }
        Ok(access_token)
    }

    /// Tear down the episode's session and pick the failure waiters receive.
    ///
    /// A session replaced mid-refresh is kept and waiters see `SessionEnded`.
    fn fail(&self, session: Option<&Session>, failure: RefreshFailure) -> RefreshFailure {
        let reason = match failure {
            RefreshFailure::SessionEnded => {
                debug!("session changed during refresh, discarding grant");
                return failure;
            }
            RefreshFailure::MissingRefreshCredential => InvalidationReason::MissingRefreshCredential,
            ref other => {
                warn!(err = %other, "credential refresh failed");
                InvalidationReason::RefreshFailed { error: other.to_string() }
            }
        };
        let Some(session) = session else {
            return failure;
        };
        match self.teardown.invalidate_session(session, reason) {
            Invalidation::Superseded => RefreshFailure::SessionEnded,
            Invalidation::Cleared | Invalidation::AlreadyGone => failure,
        }
    }

    /// Return to `Idle` and resolve every waiter, in arrival order.
    fn release(&self, outcome: Outcome) {
        let waiters = {
            let mut inner = self.inner.lock();
            inner.state = RefreshState::Idle;
            std::mem::take(&mut inner.waiters)
        };
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "releasing refresh waiters");
        for waiter in waiters {
            // A waiter whose caller went away is simply skipped.
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Guarantees the waiters are released even if the episode task unwinds.
struct Episode<'a> {
    coordinator: &'a RefreshCoordinator,
    released: bool,
}

impl Episode<'_> {
    fn release(mut self, outcome: Outcome) {
        self.released = true;
        self.coordinator.release(outcome);
    }
}

impl Drop for Episode<'_> {
    fn drop(&mut self) {
        if !self.released {
            self.coordinator.release(Err(RefreshFailure::Abandoned));
        }
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
