//! atlantis-drift - Terraform drift detection through Atlantis
//!
//! CLI entry point that dispatches to subcommands.

use atlantis_drift::cli::args::LogFormat;
use atlantis_drift::cli::{Cli, Commands};
use atlantis_drift::config::{Config, ConfigManager};
use atlantis_drift::error::DriftResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// 0 = info, 1 = debug, 2+ = trace; `RUST_LOG` wins when set
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("atlantis_drift=info"),
        1 => EnvFilter::new("atlantis_drift=debug"),
        _ => EnvFilter::new("atlantis_drift=trace"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn run() -> DriftResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config: Config = config_manager.load().await?;

    let format = cli.log_format.unwrap_or(match config.general.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(cli.verbose, format);

    // Dispatch to command
    match cli.command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling run");
                    on_signal.cancel();
                }
            });
            atlantis_drift::cli::commands::run(*args, &config, cancel).await
        }
        Commands::Config(args) => {
            atlantis_drift::cli::commands::config(args, &config, &config_manager).await
        }
        Commands::Cache(args) => atlantis_drift::cli::commands::cache(args, &config).await,
    }
}
