// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound transport: turns an [`ApiRequest`] into one HTTP exchange.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;

use crate::error::ApiError;
use crate::pipeline::request::{ApiRequest, ApiResponse};

/// Issues a single call and reports the reply, whatever its status.
///
/// Only failures that never produced a response are `Err`. Object-safe for
/// use as `Arc<dyn Transport>`.
pub trait Transport: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        req: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + 'a>>;
}

/// HTTP transport rooted at the remote service's base URL.
pub struct HttpTransport {
    base_url: String,
    client: Client,
}

impl HttpTransport {
    /// Build a transport with its own client bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: Client) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_owned(), client }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn send(&self, req: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .client
            .request(req.method().clone(), self.url(req.path()))
            .headers(req.headers().clone());
        if !req.query_pairs().is_empty() {
            builder = builder.query(req.query_pairs());
        }
        if let Some(body) = req.json_body() {
            builder = builder.json(body);
        } else if !req.headers().contains_key(CONTENT_TYPE) {
            builder = builder.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let resp = builder.send().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(ApiResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        req: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + 'a>> {
        Box::pin(self.send(req))
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
