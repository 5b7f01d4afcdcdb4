//! PingPong: end-to-end latency monitoring for Matrix.
//!
//! Two accounts take turns sending a message into a shared room. For every
//! round trip the time is split into client -> server, server -> server and
//! server -> client, using the origin timestamp and age the homeserver attaches
//! to each event, and shown live on a terminal dashboard (or logged with
//! `--debug`).
//!
//! Usage:
//!   matrix-pingpong @alice:matrix.org:secret @bob:example.com:secret
//!   matrix-pingpong -i 1s -d @alice:matrix.org:secret @bob:example.com:secret

mod cli;
mod correlate;
mod dashboard;
mod driver;
mod extract;
mod format;
mod graph;
mod listener;
mod matrix;
mod palette;
mod session;
mod shutdown;
mod stats;
mod types;

use anyhow::Result;
use clap::Parser;
use futures_util::future::{BoxFuture, FutureExt};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::dashboard::Dashboard;
use crate::matrix::PasswordLogin;

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    // Every fatal error ends up here, after the terminal has been restored.
    if let Err(error) = run(cli).await {
        error!("{error:#}");
        std::process::exit(1);
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Log lines go to stderr. With the dashboard up only errors are let through,
/// and the only one that can happen is printed after the screen is restored.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("error")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

// ============================================================================
// Run
// ============================================================================

/// Brings up the dashboard (unless in debug mode), runs the session until the
/// user quits, then tears the dashboard down.
///
/// # Returns
/// The first error of the session, otherwise any error restoring the terminal.
async fn run(cli: Cli) -> Result<()> {
    let dashboard = if cli.debug {
        None
    } else {
        Some(Dashboard::start(
            cli.user_one.user_id(),
            cli.user_two.user_id(),
        )?)
    };

    let quit: BoxFuture<'static, ()> = match &dashboard {
        Some(dashboard) => {
            let mut exited = dashboard.exited();
            async move { exited.wait().await }.boxed()
        }
        None => async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                error!(%error, "unable to listen for interrupt signal");
                std::future::pending::<()>().await;
            }
        }
        .boxed(),
    };

    let updates = dashboard.as_ref().map(Dashboard::updates);
    let outcome = session::run(&PasswordLogin, &cli, updates, quit).await;

    // Barrier: the render loop must be gone before anything is printed.
    let restored = match dashboard {
        Some(dashboard) => dashboard.shutdown().await,
        None => Ok(()),
    };

    outcome.and(restored)
}
