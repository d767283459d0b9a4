//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// atlantis-drift - Terraform drift detection through Atlantis
///
/// Plans every project of an Atlantis repo against its default branch and
/// reports directories whose infrastructure no longer matches the code.
#[derive(Parser, Debug)]
#[command(name = "atlantis-drift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "ATLANTIS_DRIFT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check every Atlantis project for drift
    Run(Box<RunArgs>),

    /// Show configuration
    Config(ConfigArgs),

    /// Inspect or reset the result cache
    Cache(CacheArgs),
}

/// Arguments for the run command
///
/// Every option overrides the matching config file value.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// GitHub repository (owner/name)
    #[arg(long, env = "REPO")]
    pub repo: Option<String>,

    /// Atlantis base URL
    #[arg(long, env = "ATLANTIS_HOST")]
    pub atlantis_host: Option<String>,

    /// Atlantis API secret
    #[arg(long, env = "ATLANTIS_TOKEN", hide_env_values = true)]
    pub atlantis_token: Option<String>,

    /// Ref planned as the desired state
    #[arg(long, env = "ATLANTIS_REF")]
    pub atlantis_ref: Option<String>,

    /// Only scan these directories (comma-separated)
    #[arg(long, env = "DIRECTORY_WHITELIST", value_delimiter = ',')]
    pub directory_whitelist: Vec<String>,

    /// Slack incoming webhook for notifications
    #[arg(long, env = "SLACK_WEBHOOK_URL", hide_env_values = true)]
    pub slack_webhook_url: Option<String>,

    /// Skip comparing remote workspaces with atlantis.yaml
    #[arg(long, env = "SKIP_WORKSPACE_CHECK", num_args = 0..=1, default_missing_value = "true")]
    pub skip_workspace_check: Option<bool>,

    /// Report configured workspaces missing from the backend
    #[arg(long, env = "CHECK_MISSING_WORKSPACES", num_args = 0..=1, default_missing_value = "true")]
    pub check_missing_workspaces: Option<bool>,

    /// Directories checked concurrently
    #[arg(long, env = "PARALLEL_RUNS")]
    pub parallel_runs: Option<usize>,

    /// Cache table name; unset disables caching between runs
    #[arg(long, env = "CACHE_TABLE")]
    pub cache_table: Option<String>,

    /// Directory holding cache tables
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// How long a cached check is trusted (e.g. 24h, 90m)
    #[arg(long, env = "CACHE_VALID_DURATION", value_parser = humantime::parse_duration)]
    pub cache_valid_duration: Option<Duration>,

    /// Owner of the repo holding the drift workflow
    #[arg(long, env = "WORKFLOW_OWNER")]
    pub workflow_owner: Option<String>,

    /// Repo holding the drift workflow
    #[arg(long, env = "WORKFLOW_REPO")]
    pub workflow_repo: Option<String>,

    /// Workflow file name or id
    #[arg(long, env = "WORKFLOW_ID")]
    pub workflow_id: Option<String>,

    /// Ref to run the workflow on
    #[arg(long, env = "WORKFLOW_REF")]
    pub workflow_ref: Option<String>,

    /// Use an existing checkout instead of cloning
    #[arg(long)]
    pub repo_dir: Option<PathBuf>,

    /// Token used to clone the repository
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show merged configuration with secrets redacted
    Show(Box<RunArgs>),

    /// Show configuration file path
    Path,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Output format for list command
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Table,
    /// JSON output
    Json,
    /// Simple text (one per line)
    Plain,
}

/// Arguments for the cache command
#[derive(Parser, Debug)]
pub struct CacheArgs {
    /// Cache table (defaults to the configured one)
    #[arg(long, global = true, env = "CACHE_TABLE")]
    pub table: Option<String>,

    /// Directory holding cache tables
    #[arg(long, global = true, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Subcommand for cache
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List cached check results
    List {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove every cached result so the next run rechecks everything
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn cli_parses_run() {
        let cli = Cli::parse_from([
            "atlantis-drift",
            "run",
            "--repo",
            "acme/infra",
            "--directory-whitelist",
            "env/a,env/b",
            "--cache-valid-duration",
            "90m",
            "--skip-workspace-check",
        ]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.repo.as_deref(), Some("acme/infra"));
                assert_eq!(args.directory_whitelist, vec!["env/a", "env/b"]);
                assert_eq!(args.cache_valid_duration, Some(Duration::from_secs(5400)));
                assert_eq!(args.skip_workspace_check, Some(true));
                assert_eq!(args.check_missing_workspaces, None);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn bool_flags_accept_values() {
        let cli = Cli::parse_from(["atlantis-drift", "run", "--skip-workspace-check", "false"]);
        match cli.command {
            Commands::Run(args) => assert_eq!(args.skip_workspace_check, Some(false)),
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["atlantis-drift", "-vv", "--log-format", "json", "config", "path"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigArgs {
                action: Some(ConfigAction::Path)
            })
        ));
    }

    #[test]
    fn cli_parses_cache_list() {
        let cli = Cli::parse_from([
            "atlantis-drift",
            "cache",
            "--table",
            "drift",
            "list",
            "--format",
            "json",
        ]);
        match cli.command {
            Commands::Cache(args) => {
                assert_eq!(args.table.as_deref(), Some("drift"));
                assert!(matches!(
                    args.action,
                    CacheAction::List {
                        format: OutputFormat::Json
                    }
                ));
            }
            _ => panic!("expected Cache command"),
        }
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let result = Cli::try_parse_from([
            "atlantis-drift",
            "run",
            "--cache-valid-duration",
            "soon",
        ]);
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn run_reads_environment() {
        std::env::set_var("PARALLEL_RUNS", "4");
        std::env::set_var("ATLANTIS_REF", "main");
        let cli = Cli::parse_from(["atlantis-drift", "run"]);
        std::env::remove_var("PARALLEL_RUNS");
        std::env::remove_var("ATLANTIS_REF");

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.parallel_runs, Some(4));
                assert_eq!(args.atlantis_ref.as_deref(), Some("main"));
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
