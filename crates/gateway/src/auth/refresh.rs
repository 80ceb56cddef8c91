// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh credential exchange over HTTP.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use crate::auth::{AuthResponse, RefreshRequest, REFRESH_PATH};
use crate::error::RefreshFailure;
use crate::pipeline::coordinator::TokenRefresher;
use crate::session::TokenGrant;

/// Calls the refresh endpoint with a bare client.
///
/// Deliberately bypasses [`crate::pipeline::ApiClient`] so a rejected refresh
/// cannot recurse into another refresh. Issues one call per invocation; the
/// coordinator owns timeouts and there are no retries here.
pub struct HttpRefresher {
    url: String,
    client: reqwest::Client,
}

impl HttpRefresher {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        Self { url: format!("{}{REFRESH_PATH}", base_url.trim_end_matches('/')), client }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn do_refresh(&self, refresh_token: &str) -> Result<TokenGrant, RefreshFailure> {
        let resp = self
            .client
            .post(&self.url)
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "refresh endpoint rejected the refresh credential");
            return Err(RefreshFailure::Rejected { status: status.as_u16(), body });
        }

        let bytes = resp.bytes().await.map_err(|e| RefreshFailure::Transport(e.to_string()))?;
        let parsed: AuthResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RefreshFailure::MalformedResponse(e.to_string()))?;
        parsed.into_grant().ok_or_else(|| {
            RefreshFailure::MalformedResponse("response carries no access token".to_owned())
        })
    }
}

impl TokenRefresher for HttpRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshFailure>> + Send + 'a>> {
        Box::pin(self.do_refresh(refresh_token))
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
