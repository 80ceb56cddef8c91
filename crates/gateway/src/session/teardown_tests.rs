// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::test_support::session;

fn setup() -> (Arc<SessionStore>, SessionSignals, Teardown) {
    let store = Arc::new(SessionStore::in_memory());
    let signals = SessionSignals::new();
    let teardown = Teardown::new(Arc::clone(&store), signals.clone());
    (store, signals, teardown)
}

#[tokio::test]
async fn invalidate_clears_and_signals_once() {
    let (store, signals, teardown) = setup();
    let mut rx = signals.subscribe();
    store.set(session("a1", Some("r1")));

    assert!(teardown.invalidate(InvalidationReason::MissingRefreshCredential));
    assert!(!teardown.invalidate(InvalidationReason::Logout));
    assert!(!store.is_active());

    let event = rx.try_recv();
    assert!(matches!(
        event,
        Ok(SessionEvent::Invalidated { reason: InvalidationReason::MissingRefreshCredential })
    ));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn invalidate_without_session_is_silent() {
    let (_store, signals, teardown) = setup();
    let mut rx = signals.subscribe();

    assert!(!teardown.invalidate(InvalidationReason::Logout));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn concurrent_invalidations_emit_single_event() -> anyhow::Result<()> {
    let (store, signals, teardown) = setup();
    let mut rx = signals.subscribe();
    store.set(session("a1", None));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let t = teardown.clone();
        handles.push(tokio::spawn(async move {
            t.invalidate(InvalidationReason::RefreshFailed { error: "boom".into() })
        }));
    }
    let mut cleared = 0;
    for h in handles {
        if h.await? {
            cleared += 1;
        }
    }

    assert_eq!(cleared, 1);
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn invalidate_session_keeps_a_replacement() {
    let (store, signals, teardown) = setup();
    let mut rx = signals.subscribe();
    let stale = session("stale", Some("r1"));
    store.set(session("other", Some("r-other")));

    let outcome = teardown.invalidate_session(&stale, InvalidationReason::MissingRefreshCredential);

    assert_eq!(outcome, Invalidation::Superseded);
    assert_eq!(store.access_token().as_deref(), Some("other"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn invalidate_session_clears_the_matching_session_once() {
    let (store, signals, teardown) = setup();
    let mut rx = signals.subscribe();
    let current = session("a1", Some("r1"));
    store.set(current.clone());

    let reason = InvalidationReason::RefreshFailed { error: "revoked".into() };
    assert_eq!(teardown.invalidate_session(&current, reason.clone()), Invalidation::Cleared);
    assert_eq!(teardown.invalidate_session(&current, reason), Invalidation::AlreadyGone);
    assert!(!store.is_active());

    assert!(matches!(
        rx.try_recv(),
        Ok(SessionEvent::Invalidated { reason: InvalidationReason::RefreshFailed { .. } })
    ));
    assert!(rx.try_recv().is_err());
}
