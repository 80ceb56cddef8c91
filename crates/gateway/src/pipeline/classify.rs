// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure classifier: decides which completed calls may trigger a refresh.

use crate::pipeline::request::ApiRequest;

/// Which statuses count as "credential expired".
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatusPolicy {
    /// 401 and 403 both trigger a refresh (the remote uses them interchangeably).
    #[default]
    ExpiredOrForbidden,
    /// Only 401 triggers a refresh; 403 passes through as an ordinary error.
    ExpiredOnly,
}

impl AuthStatusPolicy {
    pub fn is_auth_failure(self, status: u16) -> bool {
        match self {
            Self::ExpiredOrForbidden => status == 401 || status == 403,
            Self::ExpiredOnly => status == 401,
        }
    }
}

/// Outcome of classifying one completed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Success, or an error the coordinator has no opinion on.
    NotAuthFailure,
    /// Credential expiry on a first attempt: eligible for refresh.
    AuthFailureFirstAttempt,
    /// Credential expiry on the post-refresh retry: fatal, never retried again.
    AuthFailureAlreadyRetried,
}

pub fn classify(status: u16, req: &ApiRequest, policy: AuthStatusPolicy) -> Classification {
    if req.is_refresh_exempt() || !policy.is_auth_failure(status) {
        return Classification::NotAuthFailure;
    }
    if req.is_retry() {
        Classification::AuthFailureAlreadyRetried
    } else {
        Classification::AuthFailureFirstAttempt
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
