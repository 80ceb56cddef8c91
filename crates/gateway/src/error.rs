// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::time::Duration;

/// Errors surfaced to callers of the request pipeline.
///
/// Cloneable because a single refresh outcome is fanned out to every caller
/// that was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The remote answered with a non-success status. Passed through as-is.
    Status { status: u16, body: String },
    /// The call never produced an HTTP response (connect, timeout, IO).
    Transport(String),
    /// A success response whose body could not be decoded.
    Decode(String),
    /// The credential could not be refreshed; the session has been torn down.
    SessionExpired(RefreshFailure),
    /// The operation needs a session and none exists.
    NotAuthenticated,
    /// The request descriptor could not be turned into a call.
    InvalidRequest(String),
}

impl ApiError {
    /// HTTP status carried by this error, if it came from a remote reply.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::SessionExpired(RefreshFailure::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Status { status: 400, .. } => "BAD_REQUEST",
            Self::Status { status: 401, .. } => "UNAUTHORIZED",
            Self::Status { status: 403, .. } => "FORBIDDEN",
            Self::Status { status: 404, .. } => "NOT_FOUND",
            Self::Status { status: 409, .. } => "CONFLICT",
            Self::Status { status, .. } if *status >= 500 => "UPSTREAM_ERROR",
            Self::Status { .. } => "REQUEST_FAILED",
            Self::Transport(_) => "TRANSPORT",
            Self::Decode(_) => "DECODE",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::NotAuthenticated => "NOT_AUTHENTICATED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Whether the host must send the user back through login.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::NotAuthenticated)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } if body.is_empty() => {
                write!(f, "{} ({status})", self.code())
            }
            Self::Status { status, body } => write!(f, "{} ({status}): {body}", self.code()),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::SessionExpired(cause) => write!(f, "session expired: {cause}"),
            Self::NotAuthenticated => f.write_str("not authenticated"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<RefreshFailure> for ApiError {
    fn from(cause: RefreshFailure) -> Self {
        Self::SessionExpired(cause)
    }
}

/// Why a credential refresh episode ended without a new access credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// No refresh credential was stored; no network call was made.
    MissingRefreshCredential,
    /// The refresh endpoint answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The refresh call failed before producing a response.
    Transport(String),
    /// The refresh endpoint answered without a usable access credential.
    MalformedResponse(String),
    /// The refresh call did not complete in time.
    TimedOut(Duration),
    /// The session was cleared or replaced while the refresh was in flight.
    SessionEnded,
    /// The refresh task went away without reporting an outcome.
    Abandoned,
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRefreshCredential => f.write_str("no refresh credential available"),
            Self::Rejected { status, body } if body.is_empty() => {
                write!(f, "refresh rejected ({status})")
            }
            Self::Rejected { status, body } => write!(f, "refresh rejected ({status}): {body}"),
            Self::Transport(msg) => write!(f, "refresh transport error: {msg}"),
            Self::MalformedResponse(msg) => write!(f, "malformed refresh response: {msg}"),
            Self::TimedOut(after) => write!(f, "refresh timed out after {after:?}"),
            Self::SessionEnded => f.write_str("session ended during refresh"),
            Self::Abandoned => f.write_str("refresh abandoned"),
        }
    }
}

impl std::error::Error for RefreshFailure {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
