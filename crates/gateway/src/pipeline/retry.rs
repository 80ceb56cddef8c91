// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry executor: re-issues a held request once with the fresh credential.

use tracing::debug;

use crate::error::ApiError;
use crate::pipeline::request::{augment, ApiRequest, ApiResponse};
use crate::pipeline::transport::Transport;

/// Copy of `original`, marked as retried and carrying `access_token`.
pub fn prepare(original: &ApiRequest, access_token: &str) -> ApiRequest {
    let mut retry = original.clone();
    retry.mark_retried();
    augment(&mut retry, Some(access_token));
    retry
}

/// Send the retry exactly once and hand back its outcome unmodified.
///
/// Returns the issued request alongside the reply so the caller can classify
/// it; a credential failure on a retried request is fatal.
pub async fn reissue(
    transport: &dyn Transport,
    original: &ApiRequest,
    access_token: &str,
) -> Result<(ApiRequest, ApiResponse), ApiError> {
    let retry = prepare(original, access_token);
    debug!(method = %retry.method(), path = %retry.path(), "re-issuing request after refresh");
    let resp = transport.execute(&retry).await?;
    Ok((retry, resp))
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
