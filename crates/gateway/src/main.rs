// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use ecgate::config::Cli;
use ecgate::error::ApiError;

/// Exit code when the user has to log in (again).
const EXIT_REAUTH: i32 = 3;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.gateway.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli);

    // reqwest is built without a bundled provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    if let Err(e) = ecgate::run(cli).await {
        if let Some(api) = e.downcast_ref::<ApiError>() {
            eprintln!("error: {api}");
            if api.requires_reauth() {
                std::process::exit(EXIT_REAUTH);
            }
            std::process::exit(1);
        }
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

/// Log to stderr so command output on stdout stays machine-readable.
fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber =
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false);
    if cli.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
