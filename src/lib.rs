pub mod cli;
pub mod core;
pub mod providers;

use crate::core::AggregateReport;
use crate::core::config::AppConfig;
use anyhow::{Result, anyhow};
use tracing::{debug, info};

/// Commands that need a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Value the positions file and print the profit report.
    Profit { input: Option<String> },
}

/// Loads the config and runs `command`. An explicit `config_path` must exist;
/// without one the default path is tried and the defaults are used if the
/// file is absent.
pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
) -> Result<AggregateReport> {
    info!("coinpnl starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    run_with_config(command, &config).await
}

pub async fn run_with_config(command: AppCommand, config: &AppConfig) -> Result<AggregateReport> {
    match command {
        AppCommand::Profit { input } => {
            tokio::select! {
                result = cli::profit::run(config, input.as_deref()) => result,
                _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted, pending price lookups cancelled")),
            }
        }
    }
}
