// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session store: the current access credential, optional refresh credential,
//! and identity snapshot.
//!
//! The store is the only mutable state shared by the pipeline. Every write
//! (establish, refresh, clear) takes the same lock, so the three writers are
//! mutually exclusive. When backed by a file, the file is rewritten under the
//! lock so disk order matches memory order.

pub mod persist;
pub mod teardown;

use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::session::persist::PersistedSession;

/// Authorization role carried in the identity snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        if s.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admin => f.write_str("ADMIN"),
            Self::User => f.write_str("USER"),
        }
    }
}

/// Minimal identity snapshot kept alongside the credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Credentials issued by the remote on refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Rotated refresh credential, if the remote issued one.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("rotated", &self.refresh_token.is_some())
            .finish()
    }
}

/// An authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub(crate) access_token: String,
    pub(crate) refresh_token: Option<String>,
    pub identity: Identity,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        identity: Identity,
    ) -> Self {
        Self { access_token: access_token.into(), refresh_token, identity }
    }

    pub fn has_refresh_credential(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("identity", &self.identity)
            .finish()
    }
}

impl From<PersistedSession> for Session {
    fn from(p: PersistedSession) -> Self {
        Self { access_token: p.access_token, refresh_token: p.refresh_token, identity: p.identity }
    }
}

impl From<&Session> for PersistedSession {
    fn from(s: &Session) -> Self {
        Self {
            access_token: s.access_token.clone(),
            refresh_token: s.refresh_token.clone(),
            identity: s.identity.clone(),
        }
    }
}

/// Result of [`SessionStore::clear_if_current`].
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ClearOutcome {
    Cleared(Session),
    /// Nothing was stored.
    Absent,
    /// A different session is stored; it was kept.
    Replaced,
}

/// Durable holder for the current [`Session`].
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self { current: RwLock::new(None), path: None }
    }

    /// A store backed by a JSON file, seeded from it when present.
    ///
    /// An unreadable file is logged and treated as no session.
    pub fn persistent(path: PathBuf) -> Self {
        let restored = match persist::load(&path) {
            Ok(found) => found.map(Session::from),
            Err(e) => {
                warn!(path = %path.display(), err = %e, "ignoring unreadable session file");
                None
            }
        };
        if let Some(ref session) = restored {
            debug!(email = %session.identity.email, "restored persisted session");
        }
        Self { current: RwLock::new(restored), path: Some(path) }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.current.read().as_ref().map(|s| s.identity.clone())
    }

    pub fn get(&self) -> Option<Session> {
        self.current.read().clone()
    }

    pub(crate) fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.access_token.clone())
    }

    pub(crate) fn refresh_token(&self) -> Option<String> {
        self.current.read().as_ref().and_then(|s| s.refresh_token.clone())
    }

    /// Replace whatever is stored with a freshly established session.
    pub fn set(&self, session: Session) {
        let mut current = self.current.write();
        self.persist(Some(&session));
        *current = Some(session);
    }

    /// Apply a refresh grant to the session it was obtained for.
    ///
    /// `refreshed_with` is the refresh credential that was exchanged. If the
    /// session was cleared or replaced meanwhile, nothing is written and
    /// `false` is returned. A grant without a rotated refresh credential keeps
    /// the existing one.
    pub(crate) fn apply_grant(&self, refreshed_with: &str, grant: TokenGrant) -> bool {
        let mut current = self.current.write();
        let Some(session) = current.as_mut() else {
            return false;
        };
        if session.refresh_token.as_deref() != Some(refreshed_with) {
            return false;
        }
        session.access_token = grant.access_token;
        if let Some(rotated) = grant.refresh_token {
            session.refresh_token = Some(rotated);
        }
        let snapshot = session.clone();
        self.persist(Some(&snapshot));
        true
    }

    /// Remove the session, returning what was stored.
    pub fn clear(&self) -> Option<Session> {
        let mut current = self.current.write();
        let previous = current.take();
        if previous.is_some() {
            self.persist(None);
        }
        previous
    }

    /// Remove the session only if it still holds the credentials of `expected`.
    ///
    /// A session established after `expected` was read (a login during a
    /// refresh) is left alone and reported as [`ClearOutcome::Replaced`].
    pub(crate) fn clear_if_current(&self, expected: &Session) -> ClearOutcome {
        let mut current = self.current.write();
        let same = match current.as_ref() {
            None => return ClearOutcome::Absent,
            Some(s) => {
                s.access_token == expected.access_token && s.refresh_token == expected.refresh_token
            }
        };
        if !same {
            return ClearOutcome::Replaced;
        }
        let previous = current.take();
        self.persist(None);
        match previous {
            Some(session) => ClearOutcome::Cleared(session),
            None => ClearOutcome::Absent,
        }
    }

    fn persist(&self, session: Option<&Session>) {
        let Some(ref path) = self.path else {
            return;
        };
        match session {
            Some(s) => {
                if let Err(e) = persist::save(path, &PersistedSession::from(s)) {
                    warn!(path = %path.display(), err = %e, "failed to persist session");
                }
            }
            None => {
                if let Err(e) = persist::remove(path) {
                    error!(path = %path.display(), err = %e, "cleared session is still on disk");
                }
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
