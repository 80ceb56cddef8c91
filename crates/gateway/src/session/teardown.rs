// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session teardown: clear the store and tell the host to re-authenticate.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::events::{InvalidationReason, SessionEvent, SessionSignals};
use crate::session::{ClearOutcome, Session, SessionStore};

/// Clears the session and raises [`SessionEvent::Invalidated`].
///
/// Idempotent: only the call that actually removes a session emits the
/// signal, so overlapping teardowns (a failed refresh racing a logout)
/// produce a single invalidation.
#[derive(Clone)]
pub struct Teardown {
    store: Arc<SessionStore>,
    signals: SessionSignals,
}

impl Teardown {
    pub fn new(store: Arc<SessionStore>, signals: SessionSignals) -> Self {
        Self { store, signals }
    }

    /// Returns `true` if this call cleared a session.
    pub fn invalidate(&self, reason: InvalidationReason) -> bool {
        let Some(previous) = self.store.clear() else {
            return false;
        };
        self.announce(&previous, reason);
        true
    }

    /// Tear down `session` only if it is still the stored one.
    ///
    /// Used when a refresh fails: a session established while the refresh
    /// was in flight belongs to a new login and survives.
    pub(crate) fn invalidate_session(&self, session: &Session, reason: InvalidationReason) -> Invalidation {
        match self.store.clear_if_current(session) {
            ClearOutcome::Cleared(previous) => {
                self.announce(&previous, reason);
                Invalidation::Cleared
            }
            ClearOutcome::Absent => Invalidation::AlreadyGone,
            ClearOutcome::Replaced => {
                debug!(reason = ?reason, "session replaced since refresh began, keeping it");
                Invalidation::Superseded
            }
        }
    }

    fn announce(&self, previous: &Session, reason: InvalidationReason) {
        match reason {
            InvalidationReason::Logout => {
                info!(email = %previous.identity.email, "session closed");
            }
            ref other => {
                warn!(email = %previous.identity.email, reason = ?other, "session invalidated");
            }
        }
        self.signals.emit(SessionEvent::Invalidated { reason });
    }
}

/// Outcome of [`Teardown::invalidate_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invalidation {
    Cleared,
    /// Some other path already removed the session.
    AlreadyGone,
    /// A newer session is stored and was kept.
    Superseded,
}

#[cfg(test)]
#[path = "teardown_tests.rs"]
mod tests;
