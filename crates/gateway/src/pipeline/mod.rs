// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated request pipeline.
//!
//! Every call flows augmenter → transport → classifier. A first-attempt
//! credential failure parks the caller on the [`RefreshCoordinator`]; once a
//! fresh credential is available the request is re-issued exactly once.

pub mod classify;
pub mod coordinator;
pub mod request;
pub mod retry;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::refresh::HttpRefresher;
use crate::config::GatewayConfig;
use crate::error::ApiError;
use crate::events::{SessionEvent, SessionSignals};
use crate::session::teardown::Teardown;
use crate::session::{Identity, SessionStore};

pub use classify::{classify, AuthStatusPolicy, Classification};
pub use coordinator::{RefreshCoordinator, RefreshState, TokenRefresher};
pub use request::{augment, ApiRequest, ApiResponse};
pub use transport::{HttpTransport, Transport};

/// Upper bound on one refresh call unless configured otherwise.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the remote API with transparent credential refresh.
///
/// Cheap to clone; clones share the session, the signals and the
/// coordinator, so concurrent calls from any clone join the same refresh.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<SessionStore>,
    pub(crate) signals: SessionSignals,
    pub(crate) teardown: Teardown,
    coordinator: Arc<RefreshCoordinator>,
    policy: AuthStatusPolicy,
}

impl ApiClient {
    pub fn builder(
        transport: Arc<dyn Transport>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> ApiClientBuilder {
        ApiClientBuilder {
            transport,
            refresher,
            store: None,
            signals: None,
            policy: AuthStatusPolicy::default(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    /// Build the HTTP-backed client described by `config`.
    ///
    /// The persisted session, if any, is restored here.
    pub fn from_config(config: &GatewayConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        let transport = Arc::new(HttpTransport::with_client(&config.base_url, client.clone()));
        let refresher = Arc::new(HttpRefresher::new(&config.base_url, client));
        let store = match config.session_path() {
            Some(path) => SessionStore::persistent(path),
            None => SessionStore::in_memory(),
        };
        Ok(Self::builder(transport, refresher)
            .store(Arc::new(store))
            .policy(config.auth_status_policy())
            .refresh_timeout(config.refresh_timeout())
            .build())
    }

    /// Send `req` through the pipeline.
    ///
    /// Non-success replies come back as [`ApiError::Status`] untouched, unless
    /// they are a first-attempt credential failure, which is recovered by a
    /// refresh and a single retry.
    pub async fn send(&self, mut req: ApiRequest) -> Result<ApiResponse, ApiError> {
        augment(&mut req, self.store.access_token().as_deref());
        let resp = self.transport.execute(&req).await?;

        let class = classify(resp.status, &req, self.policy);
        if class != Classification::AuthFailureFirstAttempt {
            return settle(class, &req, resp);
        }

        debug!(status = resp.status, path = %req.path(), "credential rejected, waiting for refresh");
        let access_token = self.coordinator.recover(req.bearer()).await?;
        let (retried, resp) = retry::reissue(self.transport.as_ref(), &req, &access_token).await?;
        settle(classify(resp.status, &retried, self.policy), &retried, resp)
    }

    /// Send `req` and decode a JSON reply.
    pub async fn send_json<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        self.send(req).await?.json()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.signals.subscribe()
    }

    pub fn signals(&self) -> &SessionSignals {
        &self.signals
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_active()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.store.identity()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

/// Turn a classified reply into the caller's result.
fn settle(class: Classification, req: &ApiRequest, resp: ApiResponse) -> Result<ApiResponse, ApiError> {
    if class == Classification::AuthFailureAlreadyRetried {
        warn!(status = resp.status, path = %req.path(), "credential rejected again after refresh");
    }
    if resp.is_success() {
        Ok(resp)
    } else {
        Err(resp.into_error())
    }
}

pub struct ApiClientBuilder {
    transport: Arc<dyn Transport>,
    refresher: Arc<dyn TokenRefresher>,
    store: Option<Arc<SessionStore>>,
    signals: Option<SessionSignals>,
    policy: AuthStatusPolicy,
    refresh_timeout: Duration,
}

impl ApiClientBuilder {
    pub fn store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn signals(mut self, signals: SessionSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn policy(mut self, policy: AuthStatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn build(self) -> ApiClient {
        let store = self.store.unwrap_or_default();
        let signals = self.signals.unwrap_or_default();
        let teardown = Teardown::new(Arc::clone(&store), signals.clone());
        let coordinator = RefreshCoordinator::new(
            self.refresher,
            Arc::clone(&store),
            teardown.clone(),
            signals.clone(),
            self.refresh_timeout,
        );
        ApiClient {
            transport: self.transport,
            store,
            signals,
            teardown,
            coordinator,
            policy: self.policy,
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
