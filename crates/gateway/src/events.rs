// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle signals for the embedding application.
//!
//! The pipeline never navigates anywhere. It announces that a session was
//! established or invalidated, and the host decides what to show next.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// How a session came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstablishedBy {
    Login,
    Register,
    Refresh,
}

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidationReason {
    /// The host asked to log out.
    Logout,
    /// An auth failure occurred and there was no refresh credential to use.
    MissingRefreshCredential,
    /// The refresh call failed.
    RefreshFailed { error: String },
}

/// Events raised to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session was created or its credentials were renewed.
    Established { email: String, by: EstablishedBy },
    /// The session was cleared; the host should send the user to log in again.
    Invalidated { reason: InvalidationReason },
}

/// Broadcast hub for [`SessionEvent`]s.
#[derive(Clone)]
pub struct SessionSignals {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionSignals {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Send an event. Having no subscribers is not an error.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for SessionSignals {
    fn default() -> Self {
        Self::new()
    }
}
