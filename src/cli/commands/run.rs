//! Run command - check every Atlantis project for drift

use crate::atlantis::AtlantisClient;
use crate::cache::{FileStore, KeyedCache, NoopCache, ResultCache};
use crate::checkout::{self, Checkout, GitCloner};
use crate::cli::args::RunArgs;
use crate::config::schema::normalize_whitelist;
use crate::config::{Config, ConfigManager};
use crate::error::DriftResult;
use crate::notification::{
    GhWorkflowDispatcher, LogNotification, MultiNotification, SlackWebhook, Workflow,
    WorkflowTarget,
};
use crate::orchestration::Drifter;
use crate::terraform::TerraformClient;
use console::style;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Execute the run command
pub async fn execute(args: RunArgs, config: &Config, cancel: CancellationToken) -> DriftResult<()> {
    let config = merge(config, &args);
    config.validate()?;

    let run_id = Uuid::new_v4();
    let span = info_span!("run", %run_id, repo = %config.repo.name);
    drift(&config, &cancel).instrument(span).await?;

    println!(
        "{} Drift check of {} complete",
        style("✓").green(),
        config.repo.name
    );
    Ok(())
}

/// Overlay command-line and environment values on the file configuration
pub fn merge(config: &Config, args: &RunArgs) -> Config {
    let mut config = config.clone();

    if let Some(repo) = &args.repo {
        config.repo.name = repo.clone();
    }
    if let Some(host) = &args.atlantis_host {
        config.atlantis.host = host.clone();
    }
    if let Some(token) = &args.atlantis_token {
        config.atlantis.token = token.clone();
    }
    if let Some(git_ref) = &args.atlantis_ref {
        config.atlantis.git_ref = git_ref.clone();
    }
    let whitelist = normalize_whitelist(&args.directory_whitelist);
    if !whitelist.is_empty() {
        config.repo.directory_whitelist = whitelist;
    }
    if let Some(url) = &args.slack_webhook_url {
        config.notification.slack_webhook_url = Some(url.clone());
    }
    if let Some(skip) = args.skip_workspace_check {
        config.scan.skip_workspace_check = skip;
    }
    if let Some(check) = args.check_missing_workspaces {
        config.scan.check_missing_workspaces = check;
    }
    if let Some(parallel_runs) = args.parallel_runs {
        config.scan.parallel_runs = parallel_runs;
    }
    if let Some(table) = &args.cache_table {
        config.cache.table = Some(table.clone());
    }
    if let Some(dir) = &args.cache_dir {
        config.cache.dir = Some(dir.clone());
    }
    if let Some(valid) = args.cache_valid_duration {
        config.cache.valid_duration = valid;
    }

    let workflow = &mut config.notification.workflow;
    if let Some(owner) = &args.workflow_owner {
        workflow.owner = owner.clone();
    }
    if let Some(repo) = &args.workflow_repo {
        workflow.repo = repo.clone();
    }
    if let Some(id) = &args.workflow_id {
        workflow.id = id.clone();
    }
    if let Some(git_ref) = &args.workflow_ref {
        workflow.git_ref = git_ref.clone();
    }

    if let Some(dir) = &args.repo_dir {
        config.repo.local_dir = Some(dir.clone());
    }
    if let Some(token) = &args.github_token {
        config.repo.github_token = Some(token.clone());
    }
    config
}

/// Open the configured cache table, or a cache that forgets everything
pub async fn open_cache(config: &Config) -> DriftResult<Arc<dyn ResultCache>> {
    let Some(table) = config.cache.table.as_deref().filter(|t| !t.is_empty()) else {
        info!("No cache table configured, every run starts cold");
        return Ok(Arc::new(NoopCache));
    };

    let dir = config
        .cache
        .dir
        .clone()
        .unwrap_or_else(ConfigManager::cache_dir);
    let cache = KeyedCache::new(FileStore::open(&dir, table).await?);
    cache.verify().await?;
    info!(table, "Using cache table in {}", dir.display());
    Ok(Arc::new(cache))
}

/// Log sink plus whichever optional sinks are configured
pub fn build_notification(config: &Config) -> MultiNotification {
    let mut sinks = MultiNotification::new().with(Arc::new(LogNotification));

    if let Some(slack) = config
        .notification
        .slack_webhook_url
        .as_deref()
        .and_then(SlackWebhook::new)
    {
        info!("Slack notifications enabled");
        sinks.push(Arc::new(slack));
    }

    let workflow = &config.notification.workflow;
    if let Some(target) =
        WorkflowTarget::new(&workflow.owner, &workflow.repo, &workflow.id, &workflow.git_ref)
    {
        info!(workflow = %target.id, repo = %target.slug(), "Workflow dispatch enabled");
        sinks.push(Arc::new(Workflow::new(
            target,
            Arc::new(GhWorkflowDispatcher::new()),
        )));
    }
    sinks
}

async fn prepare_checkout(config: &Config, cancel: &CancellationToken) -> DriftResult<Checkout> {
    if let Some(dir) = &config.repo.local_dir {
        info!("Using local checkout {}", dir.display());
        return Ok(Checkout::local(dir));
    }
    let token = checkout::github_token(&config.repo.name, config.repo.github_token.as_deref()).await?;
    GitCloner::new()
        .clone_repo(cancel, &config.repo.name, &token)
        .await
}

async fn drift(config: &Config, cancel: &CancellationToken) -> DriftResult<()> {
    let cache = open_cache(config).await?;
    let notification = build_notification(config);
    let plans = AtlantisClient::new(&config.atlantis.host, &config.atlantis.token);

    let checkout = prepare_checkout(config, cancel)
        .await
        .map_err(|e| e.context(format!("failed to checkout repo {}", config.repo.name)))?;
    let terraform = TerraformClient::new(checkout.path());

    let drifter = Drifter::new(
        config.repo.name.clone(),
        Arc::new(plans),
        Arc::new(terraform),
        Arc::new(notification),
    )
    .with_cache(cache)
    .with_ref(config.atlantis.git_ref.clone())
    .with_cache_valid_duration(config.cache.valid_duration)
    .with_directory_whitelist(config.repo.directory_whitelist.clone())
    .with_skip_workspace_check(config.scan.skip_workspace_check)
    .with_check_missing_workspaces(config.scan.check_missing_workspaces)
    .with_parallel_runs(config.scan.parallel_runs);

    info!(parallel_runs = config.scan.parallel_runs, "Starting drift detection");
    let result = drifter.drift(cancel, checkout.path()).await;
    checkout.close();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn merge_prefers_arguments() {
        let mut file = Config::default();
        file.repo.name = "acme/old".into();
        file.scan.parallel_runs = 2;
        file.repo.directory_whitelist = vec!["env/a".into()];

        let args = RunArgs {
            repo: Some("acme/infra".into()),
            atlantis_host: Some("https://atlantis.example.com".into()),
            directory_whitelist: vec![" ./env/b/ ".into(), "".into(), "env/b".into()],
            cache_valid_duration: Some(Duration::from_secs(60)),
            skip_workspace_check: Some(true),
            ..RunArgs::default()
        };
        let merged = merge(&file, &args);

        assert_eq!(merged.repo.name, "acme/infra");
        assert_eq!(merged.atlantis.host, "https://atlantis.example.com");
        assert_eq!(merged.scan.parallel_runs, 2);
        assert_eq!(merged.repo.directory_whitelist, vec!["env/b"]);
        assert_eq!(merged.cache.valid_duration, Duration::from_secs(60));
        assert!(merged.scan.skip_workspace_check);
        assert!(!merged.scan.check_missing_workspaces);
    }

    #[test]
    fn merge_keeps_file_values_when_unset() {
        let mut file = Config::default();
        file.atlantis.git_ref = "main".into();
        file.notification.workflow.id = "drift.yaml".into();
        let merged = merge(&file, &RunArgs::default());
        assert_eq!(merged.atlantis.git_ref, "main");
        assert_eq!(merged.notification.workflow.id, "drift.yaml");
    }

    #[test]
    fn notification_sinks_follow_config() {
        let config = Config::default();
        assert_eq!(build_notification(&config).len(), 1);

        let mut config = Config::default();
        config.notification.slack_webhook_url = Some("https://hooks.slack.com/x".into());
        config.notification.workflow.owner = "acme".into();
        config.notification.workflow.repo = "infra".into();
        config.notification.workflow.id = "drift.yaml".into();
        config.notification.workflow.git_ref = "main".into();
        assert_eq!(build_notification(&config).len(), 3);

        let mut config = Config::default();
        config.notification.slack_webhook_url = Some(String::new());
        config.notification.workflow.owner = "acme".into();
        assert_eq!(build_notification(&config).len(), 1);
    }

    #[tokio::test]
    async fn cache_table_opens_file_store() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.cache.table = Some("drift".into());
        config.cache.dir = Some(temp.path().to_path_buf());

        open_cache(&config).await.unwrap();
        assert!(temp.path().join("drift").is_dir());
    }

    #[tokio::test]
    async fn missing_table_means_cold_cache() {
        let cache = open_cache(&Config::default()).await.unwrap();
        let key = crate::cache::DriftCheckKey::new("env/a", "default");
        assert!(cache.get_drift_check_result(&key).await.unwrap().is_none());
    }
}
