// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::pipeline::classify::AuthStatusPolicy;

/// Default remote API root.
pub const DEFAULT_BASE_URL: &str = "https://ec-live-app-99-production.up.railway.app/api/v1";

/// Connection and session settings for the gateway.
#[derive(Debug, Clone, clap::Args)]
pub struct GatewayConfig {
    /// Base URL of the remote API.
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "EC_API_URL")]
    pub base_url: String,

    /// Path of the persisted session file.
    #[arg(long, env = "EC_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Keep the session in memory only.
    #[arg(long, env = "EC_EPHEMERAL")]
    pub ephemeral: bool,

    /// Timeout for ordinary requests in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "EC_REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: u64,

    /// Timeout for the credential refresh call in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "EC_REFRESH_TIMEOUT_MS")]
    pub refresh_timeout_ms: u64,

    /// Treat 403 like 401 and attempt a credential refresh.
    #[arg(
        long,
        default_value_t = true,
        action = clap::ArgAction::Set,
        env = "EC_REFRESH_ON_FORBIDDEN"
    )]
    pub refresh_on_forbidden: bool,
}

impl GatewayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            anyhow::bail!("--base-url must start with http:// or https://: {}", self.base_url);
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("--request-timeout-ms must be greater than zero");
        }
        if self.refresh_timeout_ms == 0 {
            anyhow::bail!("--refresh-timeout-ms must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn auth_status_policy(&self) -> AuthStatusPolicy {
        if self.refresh_on_forbidden {
            AuthStatusPolicy::ExpiredOrForbidden
        } else {
            AuthStatusPolicy::ExpiredOnly
        }
    }

    /// Where the session is persisted, or `None` for an in-memory store.
    pub fn session_path(&self) -> Option<PathBuf> {
        if self.ephemeral {
            return None;
        }
        Some(self.session_file.clone().unwrap_or_else(|| state_dir().join("session.json")))
    }
}

/// Resolve the state directory for gateway data.
///
/// Checks `EC_STATE_DIR`, then `$XDG_STATE_HOME/ecgate`,
/// then `$HOME/.local/state/ecgate`.
pub fn state_dir() -> PathBuf {
    state_dir_with(|name| std::env::var(name).ok())
}

fn state_dir_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(dir) = env("EC_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = env("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("ecgate");
    }
    if let Some(home) = env("HOME") {
        return PathBuf::from(home).join(".local/state/ecgate");
    }
    PathBuf::from(".ecgate")
}

/// Command-line client for the Event Connect API.
#[derive(Debug, Parser)]
#[command(name = "ecgate", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub gateway: GatewayConfig,

    /// Log format (json or text).
    #[arg(long, env = "EC_LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "EC_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in and store the session.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "EC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and store the session.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "EC_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session.
    Logout,
    /// Show who the stored session belongs to.
    Whoami,
    /// Send a request through the authenticated pipeline.
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE).
        method: String,
        /// Path below the base URL, e.g. `/events`.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
        /// Query parameter as `key=value`; repeatable.
        #[arg(long = "query", value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },
}

fn parse_query_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_owned(), v.to_owned())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
