//! loglinkd - keeps log symlinks in step with cluster metadata

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod daemon;
mod engine;

use cli::Cli;
use daemon::Daemon;

const LOG_TARGETS: &[&str] = &[
    "loglinkd",
    "loglink_core",
    "loglink_metadata",
    "loglink_reconcile",
    "loglink_watch",
    "loglink_health",
    "tower_http",
];

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let default_filter = LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = cli.settings();

    init_logging(settings.as_ref().map(|s| s.debug).unwrap_or(cli.debug));

    let result = match settings {
        Ok(settings) => {
            info!(
                metadata = %settings.metadata_url(),
                containers_dir = %settings.logging_containers_dir.display(),
                volumes_dir = %settings.logging_volumes_dir.display(),
                "loglinkd {} starting",
                env!("CARGO_PKG_VERSION")
            );
            Daemon::new(settings).run().await
        }
        Err(e) => Err(anyhow::Error::from(e).context("Invalid configuration")),
    };

    match result {
        Ok(()) => {
            info!("Daemon shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Exiting logging-helper with error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
