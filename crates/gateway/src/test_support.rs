// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes and helpers shared by unit and integration tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::{ApiError, RefreshFailure};
use crate::pipeline::coordinator::TokenRefresher;
use crate::pipeline::request::{ApiRequest, ApiResponse};
use crate::pipeline::transport::Transport;
use crate::session::{Identity, Role, Session, TokenGrant};

pub fn identity(email: &str) -> Identity {
    Identity { name: Some("Ann".to_owned()), email: email.to_owned(), role: Role::User }
}

pub fn session(access: &str, refresh: Option<&str>) -> Session {
    Session::new(access, refresh.map(str::to_owned), identity("ann@example.com"))
}

pub fn grant(access: &str, refresh: Option<&str>) -> TokenGrant {
    TokenGrant { access_token: access.to_owned(), refresh_token: refresh.map(str::to_owned) }
}

/// Install the rustls crypto provider (needed for reqwest even on plain HTTP).
pub fn ensure_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// Poll `cond` until it holds, failing after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not reached before deadline");
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    Ok(())
}

/// A [`TokenRefresher`] that replays scripted outcomes.
///
/// When gated, each call blocks until [`ScriptedRefresher::open`] releases it,
/// which lets tests pile up concurrent waiters deterministically.
pub struct ScriptedRefresher {
    outcomes: Mutex<VecDeque<Result<TokenGrant, RefreshFailure>>>,
    gate: Option<Semaphore>,
    delay: Duration,
    calls: AtomicU32,
    seen: Mutex<Vec<String>>,
}

impl ScriptedRefresher {
    pub fn new(outcomes: Vec<Result<TokenGrant, RefreshFailure>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            gate: None,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    /// Let one gated call through.
    pub fn open(&self) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(1);
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh credentials presented, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

impl TokenRefresher for ScriptedRefresher {
    fn refresh<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenGrant, RefreshFailure>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(refresh_token.to_owned());
            if let Some(ref gate) = self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(RefreshFailure::Rejected { status: 500, body: "unscripted".into() }))
        })
    }
}

type Responder = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync>;

/// A [`Transport`] that answers from a closure and records every request.
pub struct ScriptedTransport {
    respond: Responder,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(
        respond: impl Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self { respond: Box::new(respond), requests: Mutex::new(Vec::new()) }
    }

    /// Answer 200 to `valid` bearer credentials and 401 to anything else.
    pub fn accepting(valid: &'static [&'static str]) -> Self {
        Self::new(move |req| {
            let auth = req
                .headers()
                .get(reqwest::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            match auth {
                Some(token) if valid.contains(&token) => {
                    Ok(ApiResponse::new(200, format!(r#"{{"path":"{}","token":"{token}"}}"#, req.path())))
                }
                _ => Ok(ApiResponse::new(401, "expired")),
            }
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for ScriptedTransport {
    fn execute<'a>(
        &'a self,
        req: &'a ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, ApiError>> + Send + 'a>> {
        self.requests.lock().push(req.clone());
        let result = (self.respond)(req);
        Box::pin(async move {
            tokio::task::yield_now().await;
            result
        })
    }
}

/// Assert that a `Result` is `Err` and its message contains a substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
