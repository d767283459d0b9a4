//! Config command - show configuration

use crate::cli::args::{ConfigAction, ConfigArgs, RunArgs};
use crate::cli::commands::run::merge;
use crate::config::{Config, ConfigManager};
use crate::error::DriftResult;

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> DriftResult<()> {
    match args.action {
        None => show_config(config, &RunArgs::default())?,
        Some(ConfigAction::Show(run_args)) => show_config(config, &run_args)?,
        Some(ConfigAction::Path) => show_path(manager),
    }

    Ok(())
}

/// Render the merged configuration with secrets redacted
pub fn render(config: &Config, args: &RunArgs) -> DriftResult<String> {
    Ok(toml::to_string_pretty(&merge(config, args).redacted())?)
}

fn show_config(config: &Config, args: &RunArgs) -> DriftResult<()> {
    println!("{}", render(config, args)?);
    Ok(())
}

fn show_path(manager: &ConfigManager) {
    println!("{}", manager.path().display());
}
