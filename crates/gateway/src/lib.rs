// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! ecgate: authenticated client for the Event Connect API with single-flight
//! credential refresh.

pub mod auth;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod session;
pub mod test_support;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Cli, Command};
use crate::error::ApiError;
use crate::events::{InvalidationReason, SessionEvent};
use crate::pipeline::{ApiClient, ApiRequest};

/// Run one CLI command to completion, printing its output to stdout.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = ApiClient::from_config(&cli.gateway)?;
    let mut events = client.subscribe();

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let result = tokio::select! {
        r = execute(&client, cli.command) => r,
        _ = shutdown.cancelled() => Err(anyhow::anyhow!("interrupted")),
    };

    while let Ok(event) = events.try_recv() {
        report(&event);
    }

    let output = result?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

/// Execute `command` against `client` and return what should be printed.
pub async fn execute(client: &ApiClient, command: Command) -> anyhow::Result<String> {
    match command {
        Command::Login { email, password } => {
            let identity = client.login(&email, &password).await?;
            Ok(format!("logged in as {} ({})", identity.email, identity.role))
        }
        Command::Register { name, email, password } => {
            let identity = client.register(&name, &email, &password).await?;
            Ok(format!("registered {name} <{}> ({})", identity.email, identity.role))
        }
        Command::Logout => {
            if client.logout() {
                Ok("logged out".to_owned())
            } else {
                Ok("no active session".to_owned())
            }
        }
        Command::Whoami => {
            let identity = client.identity().ok_or(ApiError::NotAuthenticated)?;
            Ok(serde_json::to_string_pretty(&identity)?)
        }
        Command::Request { method, path, data, query } => {
            let req = build_request(&method, &path, data.as_deref(), query)?;
            let resp = client.send(req).await?;
            match serde_json::from_slice::<serde_json::Value>(&resp.body) {
                Ok(value) => Ok(serde_json::to_string_pretty(&value)?),
                Err(_) => Ok(resp.text()),
            }
        }
    }
}

fn build_request(
    method: &str,
    path: &str,
    data: Option<&str>,
    query: Vec<(String, String)>,
) -> Result<ApiRequest, ApiError> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| ApiError::InvalidRequest(format!("unknown method: {method}")))?;
    let mut req = ApiRequest::new(method, path);
    if let Some(data) = data {
        let body = serde_json::from_str(data)
            .map_err(|e| ApiError::InvalidRequest(format!("--data is not valid JSON: {e}")))?;
        req = req.body(body);
    }
    for (key, value) in query {
        req = req.query(key, value);
    }
    Ok(req)
}

/// Act on a session event the way a host application would.
fn report(event: &SessionEvent) {
    match event {
        SessionEvent::Invalidated { reason: InvalidationReason::Logout } => {}
        SessionEvent::Invalidated { reason } => {
            debug!(?reason, "session invalidated");
            eprintln!("session ended; run `ecgate login` to sign in again");
        }
        SessionEvent::Established { email, by } => {
            debug!(%email, ?by, "session established");
        }
    }
}

/// Cancel `shutdown` on the first SIGINT or SIGTERM.
fn cancel_on_signal(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let signal = termination_signal().await;
        info!(signal, "stopping");
        shutdown.cancel();
    });
}

/// Resolve with the name of the first termination signal received.
async fn termination_signal() -> &'static str {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(err = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
