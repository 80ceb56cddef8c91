// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::*;
use crate::test_support::{grant, session, wait_until, ScriptedRefresher};

struct Harness {
    store: Arc<SessionStore>,
    signals: SessionSignals,
    refresher: Arc<ScriptedRefresher>,
    coordinator: Arc<RefreshCoordinator>,
}

fn harness(refresher: ScriptedRefresher, timeout: Duration) -> Harness {
    let store = Arc::new(SessionStore::in_memory());
    let signals = SessionSignals::new();
    let refresher = Arc::new(refresher);
    let teardown = Teardown::new(Arc::clone(&store), signals.clone());
    let coordinator = RefreshCoordinator::new(
        Arc::clone(&refresher) as Arc<dyn TokenRefresher>,
        Arc::clone(&store),
        teardown,
        signals.clone(),
        timeout,
    );
    Harness { store, signals, refresher, coordinator }
}

fn spawn_recover(h: &Harness, failed_with: &'static str) -> JoinHandle<Result<String, RefreshFailure>> {
    let c = Arc::clone(&h.coordinator);
    tokio::spawn(async move { c.recover(Some(failed_with)).await })
}

#[tokio::test]
async fn concurrent_failures_share_one_refresh() -> anyhow::Result<()> {
    let h = harness(
        ScriptedRefresher::new(vec![Ok(grant("fresh", Some("r2")))]).gated(),
        Duration::from_secs(5),
    );
    h.store.set(session("stale", Some("r1")));
    let mut events = h.signals.subscribe();

    let handles: Vec<_> = (0..5).map(|_| spawn_recover(&h, "stale")).collect();
    wait_until(|| h.coordinator.pending() == 5).await?;
    wait_until(|| h.refresher.calls() == 1).await?;
    assert_eq!(h.coordinator.state(), RefreshState::Refreshing);

    h.refresher.open();
    for handle in handles {
        assert_eq!(handle.await?, Ok("fresh".to_owned()));
    }

    assert_eq!(h.refresher.calls(), 1);
    assert_eq!(h.coordinator.refresh_calls(), 1);
    assert_eq!(h.refresher.seen(), vec!["r1".to_owned()]);
    assert_eq!(h.coordinator.state(), RefreshState::Idle);
    assert_eq!(h.coordinator.pending(), 0);
    assert_eq!(h.store.access_token().as_deref(), Some("fresh"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("r2"));

    let event = events.try_recv()?;
    assert_eq!(
        event,
        SessionEvent::Established { email: "ann@example.com".into(), by: EstablishedBy::Refresh }
    );
    Ok(())
}

#[tokio::test]
async fn failed_refresh_rejects_everyone_and_clears_once() -> anyhow::Result<()> {
    let failure = RefreshFailure::Rejected { status: 401, body: "revoked".into() };
    let h = harness(
        ScriptedRefresher::new(vec![Err(failure.clone())]).gated(),
        Duration::from_secs(5),
    );
    h.store.set(session("stale", Some("r1")));
    let mut events = h.signals.subscribe();

    let handles: Vec<_> = (0..3).map(|_| spawn_recover(&h, "stale")).collect();
    wait_until(|| h.coordinator.pending() == 3).await?;
    h.refresher.open();

    for handle in handles {
        assert_eq!(handle.await?, Err(failure.clone()));
    }
    assert!(!h.store.is_active());
    assert_eq!(h.refresher.calls(), 1);

    let event = events.try_recv()?;
    assert!(matches!(
        event,
        SessionEvent::Invalidated { reason: InvalidationReason::RefreshFailed { .. } }
    ));
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn missing_refresh_credential_tears_down_without_calling() -> anyhow::Result<()> {
    let h = harness(ScriptedRefresher::new(vec![]), Duration::from_secs(5));
    h.store.set(session("stale", None));
    let mut events = h.signals.subscribe();

    let result = h.coordinator.recover(Some("stale")).await;

    assert_eq!(result, Err(RefreshFailure::MissingRefreshCredential));
    assert_eq!(h.refresher.calls(), 0);
    assert_eq!(h.coordinator.refresh_calls(), 0);
    assert!(!h.store.is_active());
    assert_eq!(
        events.try_recv()?,
        SessionEvent::Invalidated { reason: InvalidationReason::MissingRefreshCredential }
    );
    Ok(())
}

#[tokio::test]
async fn no_session_at_all_fails_closed() {
    let h = harness(ScriptedRefresher::new(vec![]), Duration::from_secs(5));
    let result = h.coordinator.recover(None).await;
    assert_eq!(result, Err(RefreshFailure::MissingRefreshCredential));
    assert_eq!(h.refresher.calls(), 0);
    assert_eq!(h.coordinator.state(), RefreshState::Idle);
}

#[tokio::test]
async fn slow_refresh_times_out_as_failure() {
    let timeout = Duration::from_millis(50);
    let h = harness(
        ScriptedRefresher::new(vec![Ok(grant("fresh", None))]).delay(Duration::from_secs(30)),
        timeout,
    );
    h.store.set(session("stale", Some("r1")));

    let result = h.coordinator.recover(Some("stale")).await;

    assert_eq!(result, Err(RefreshFailure::TimedOut(timeout)));
    assert!(!h.store.is_active());
    assert_eq!(h.coordinator.state(), RefreshState::Idle);
}

#[tokio::test]
async fn coordinator_is_reusable_after_failure() {
    let h = harness(
        ScriptedRefresher::new(vec![
            Err(RefreshFailure::Transport("connection reset".into())),
            Ok(grant("a3", None)),
        ]),
        Duration::from_secs(5),
    );
    h.store.set(session("a1", Some("r1")));
    assert!(h.coordinator.recover(Some("a1")).await.is_err());
    assert!(!h.store.is_active());

    // Host logs in again.
    h.store.set(session("a2", Some("r2")));
    assert_eq!(h.coordinator.recover(Some("a2")).await, Ok("a3".to_owned()));
    assert_eq!(h.refresher.seen(), vec!["r1".to_owned(), "r2".to_owned()]);
    assert_eq!(h.store.refresh_token().as_deref(), Some("r2"));
}

#[tokio::test]
async fn renewed_credential_is_reused_without_refresh() {
    let h = harness(ScriptedRefresher::new(vec![]), Duration::from_secs(5));
    h.store.set(session("fresh", Some("r2")));

    assert_eq!(h.coordinator.recover(Some("stale")).await, Ok("fresh".to_owned()));
    assert_eq!(h.refresher.calls(), 0);
}

#[tokio::test]
async fn login_during_refresh_discards_grant_and_keeps_new_session() -> anyhow::Result<()> {
    let h = harness(
        ScriptedRefresher::new(vec![Ok(grant("late", None))]).gated(),
        Duration::from_secs(5),
    );
    h.store.set(session("stale", Some("r1")));
    let mut events = h.signals.subscribe();

    let handle = spawn_recover(&h, "stale");
    wait_until(|| h.refresher.calls() == 1).await?;
    h.store.set(session("other", Some("r-other")));
    h.refresher.open();

    assert_eq!(handle.await?, Err(RefreshFailure::SessionEnded));
    assert_eq!(h.store.access_token().as_deref(), Some("other"));
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn login_during_failed_refresh_keeps_new_session() -> anyhow::Result<()> {
    let h = harness(
        ScriptedRefresher::new(vec![Err(RefreshFailure::Rejected { status: 401, body: "revoked".into() })])
            .gated(),
        Duration::from_secs(5),
    );
    h.store.set(session("stale", Some("r1")));
    let mut events = h.signals.subscribe();

    let handle = spawn_recover(&h, "stale");
    wait_until(|| h.refresher.calls() == 1).await?;
    h.store.set(session("other", Some("r-other")));
    h.refresher.open();

    assert_eq!(handle.await?, Err(RefreshFailure::SessionEnded));
    assert_eq!(h.store.access_token().as_deref(), Some("other"));
    assert_eq!(h.store.refresh_token().as_deref(), Some("r-other"));
    assert!(events.try_recv().is_err());
    assert_eq!(h.coordinator.state(), RefreshState::Idle);
    Ok(())
}

#[tokio::test]
async fn login_during_timed_out_refresh_keeps_new_session() -> anyhow::Result<()> {
    let timeout = Duration::from_millis(200);
    let h = harness(
        ScriptedRefresher::new(vec![Ok(grant("late", None))]).delay(Duration::from_secs(30)),
        timeout,
    );
    h.store.set(session("stale", Some("r1")));

    let handle = spawn_recover(&h, "stale");
    wait_until(|| h.refresher.calls() == 1).await?;
    h.store.set(session("other", None));

    assert_eq!(handle.await?, Err(RefreshFailure::SessionEnded));
    assert_eq!(h.store.access_token().as_deref(), Some("other"));
    Ok(())
}

#[tokio::test]
async fn waiters_are_released_in_arrival_order() -> anyhow::Result<()> {
    let h = harness(
        ScriptedRefresher::new(vec![Ok(grant("fresh", None))]).gated(),
        Duration::from_secs(5),
    );
    h.store.set(session("stale", Some("r1")));
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut handles = Vec::new();
    for i in 0..5 {
        let c = Arc::clone(&h.coordinator);
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let outcome = c.recover(Some("stale")).await;
            order.lock().push(i);
            outcome
        }));
        wait_until(|| h.coordinator.pending() == i + 1).await?;
    }
    h.refresher.open();

    for handle in handles {
        assert_eq!(handle.await?, Ok("fresh".to_owned()));
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    Ok(())
}

#[tokio::test]
async fn cancelled_trigger_does_not_strand_waiters() -> anyhow::Result<()> {
    let h = harness(
        ScriptedRefresher::new(vec![Ok(grant("fresh", None))]).gated(),
        Duration::from_secs(5),
    );
    h.store.set(session("stale", Some("r1")));

    let first = spawn_recover(&h, "stale");
    wait_until(|| h.coordinator.pending() == 1).await?;
    first.abort();
    let _ = first.await;

    let second = spawn_recover(&h, "stale");
    wait_until(|| h.coordinator.pending() == 2).await?;
    h.refresher.open();

    assert_eq!(second.await?, Ok("fresh".to_owned()));
    assert_eq!(h.refresher.calls(), 1);
    assert_eq!(h.coordinator.state(), RefreshState::Idle);
    Ok(())
}

#[tokio::test]
async fn failure_arriving_after_episode_starts_a_new_one() -> anyhow::Result<()> {
    let h = harness(
        ScriptedRefresher::new(vec![Ok(grant("a2", None)), Ok(grant("a3", None))]),
        Duration::from_secs(5),
    );
    h.store.set(session("a1", Some("r1")));

    assert_eq!(h.coordinator.recover(Some("a1")).await, Ok("a2".to_owned()));
    // a2 expires in turn.
    assert_eq!(h.coordinator.recover(Some("a2")).await, Ok("a3".to_owned()));
    assert_eq!(h.refresher.calls(), 2);
    Ok(())
}
