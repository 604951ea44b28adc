use anyhow::Result;
use clap::{Parser, Subcommand};
use coinpnl::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display profit of the positions file (default)
    Profit {
        /// Positions file, overrides `input` from the configuration
        #[arg(short, long)]
        input: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command.unwrap_or(Commands::Profit { input: None }) {
        Commands::Setup => coinpnl::cli::setup::setup(),
        Commands::Profit { input } => {
            coinpnl::run_command(
                coinpnl::AppCommand::Profit { input },
                cli.config_path.as_deref(),
            )
            .await
            .map(|_| ())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
