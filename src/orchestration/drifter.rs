//! Drift scans over the directories of an Atlantis repo

use crate::atlantis::config::DEFAULT_WORKSPACE;
use crate::atlantis::{DirectoriesWithWorkspaces, PlanClient, PlanSummaryRequest, RepoConfig};
use crate::cache::{
    DriftCheckKey, DriftCheckValue, NoopCache, RemoteWorkspacesKey, RemoteWorkspacesValue,
    ResultCache,
};
use crate::error::DriftResult;
use crate::notification::Notification;
use crate::orchestration::executor::{run_all, CheckUnit};
use crate::terraform::WorkspaceClient;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ref planned when none is configured
pub const DEFAULT_REF: &str = "master";

/// VCS type sent with every plan request
pub const VCS_TYPE: &str = "Github";

/// How long a cached check stays valid by default
pub const DEFAULT_CACHE_VALID_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs both drift scans against one repository
///
/// Cloning is cheap: collaborators are shared handles.
#[derive(Clone)]
pub struct Drifter {
    repo: String,
    git_ref: String,
    plans: Arc<dyn PlanClient>,
    terraform: Arc<dyn WorkspaceClient>,
    notification: Arc<dyn Notification>,
    cache: Arc<dyn ResultCache>,
    cache_valid_duration: Duration,
    directory_whitelist: Vec<String>,
    skip_workspace_check: bool,
    check_missing_workspaces: bool,
    parallel_runs: usize,
}

impl Drifter {
    /// Create a drifter with an always-cold cache and sequential execution
    pub fn new(
        repo: impl Into<String>,
        plans: Arc<dyn PlanClient>,
        terraform: Arc<dyn WorkspaceClient>,
        notification: Arc<dyn Notification>,
    ) -> Self {
        Self {
            repo: repo.into(),
            git_ref: DEFAULT_REF.to_string(),
            plans,
            terraform,
            notification,
            cache: Arc::new(NoopCache),
            cache_valid_duration: DEFAULT_CACHE_VALID_DURATION,
            directory_whitelist: Vec::new(),
            skip_workspace_check: false,
            check_missing_workspaces: false,
            parallel_runs: 1,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Ref whose plans count as the desired state
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = git_ref.into();
        self
    }

    pub fn with_cache_valid_duration(mut self, valid: Duration) -> Self {
        self.cache_valid_duration = valid;
        self
    }

    /// Only scan these directories; empty scans everything
    pub fn with_directory_whitelist(mut self, dirs: Vec<String>) -> Self {
        self.directory_whitelist = dirs;
        self
    }

    pub fn with_skip_workspace_check(mut self, skip: bool) -> Self {
        self.skip_workspace_check = skip;
        self
    }

    /// Also report configured workspaces the backend does not have
    pub fn with_check_missing_workspaces(mut self, check: bool) -> Self {
        self.check_missing_workspaces = check;
        self
    }

    pub fn with_parallel_runs(mut self, parallel_runs: usize) -> Self {
        self.parallel_runs = parallel_runs;
        self
    }

    /// Parse `atlantis.yaml` from a checkout and run both scans over it
    pub async fn drift(&self, cancel: &CancellationToken, checkout_root: &Path) -> DriftResult<()> {
        let config = RepoConfig::from_dir(checkout_root)
            .await
            .map_err(|e| e.context("failed to parse repo config"))?;
        let workspaces = DirectoriesWithWorkspaces::from(&config);
        info!(
            directories = workspaces.len(),
            "Loaded {} projects from repo config",
            config.projects.len()
        );

        self.find_drifted_workspaces(cancel, &workspaces)
            .await
            .map_err(|e| e.context("failed to find drifted workspaces"))?;
        self.find_extra_workspaces(cancel, &workspaces)
            .await
            .map_err(|e| e.context("failed to find extra workspaces"))?;
        Ok(())
    }

    /// Plan every configured workspace and notify about drift
    pub async fn find_drifted_workspaces(
        &self,
        cancel: &CancellationToken,
        ws: &DirectoriesWithWorkspaces,
    ) -> DriftResult<()> {
        let units = self
            .directories(ws)
            .into_iter()
            .map(|dir| {
                let drifter = self.clone();
                let workspaces = ws.get(&dir).to_vec();
                CheckUnit::new(dir.clone(), move |token| async move {
                    drifter.check_directory_drift(&token, &dir, &workspaces).await
                })
            })
            .collect();
        run_all(cancel, self.parallel_runs, units).await
    }

    /// Compare remote workspaces with the configured ones
    pub async fn find_extra_workspaces(
        &self,
        cancel: &CancellationToken,
        ws: &DirectoriesWithWorkspaces,
    ) -> DriftResult<()> {
        if self.skip_workspace_check {
            info!("Skipping remote workspace check");
            return Ok(());
        }
        let units = self
            .directories(ws)
            .into_iter()
            .map(|dir| {
                let drifter = self.clone();
                let workspaces = ws.get(&dir).to_vec();
                CheckUnit::new(dir.clone(), move |token| async move {
                    drifter.check_directory_workspaces(&token, &dir, &workspaces).await
                })
            })
            .collect();
        run_all(cancel, self.parallel_runs, units).await
    }

    /// Sorted directories that pass the whitelist
    fn directories(&self, ws: &DirectoriesWithWorkspaces) -> Vec<String> {
        ws.sorted_keys()
            .into_iter()
            .filter(|dir| {
                let keep = !self.should_skip_directory(dir);
                if !keep {
                    debug!(dir = %dir, "Skipping directory");
                }
                keep
            })
            .collect()
    }

    fn should_skip_directory(&self, dir: &str) -> bool {
        !self.directory_whitelist.is_empty() && !self.directory_whitelist.iter().any(|d| d == dir)
    }

    /// A check stamped in the future counts as fresh
    fn is_fresh(&self, checked_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - checked_at).to_std() {
            Ok(age) => age < self.cache_valid_duration,
            Err(_) => true,
        }
    }

    async fn check_directory_drift(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspaces: &[String],
    ) -> DriftResult<()> {
        info!(dir, "Checking for drifted workspaces");
        for workspace in workspaces {
            let key = DriftCheckKey::new(dir, workspace.as_str());
            let cached = self
                .cache
                .get_drift_check_result(&key)
                .await
                .map_err(|e| e.context(format!("failed to get cache value for {}/{}", dir, workspace)))?;

            if let Some(cached) = cached {
                if self.is_fresh(cached.checked_at, Utc::now()) {
                    info!(dir, workspace = %workspace, "Skipping workspace, already checked");
                    continue;
                }
                info!(
                    dir,
                    workspace = %workspace,
                    checked_at = %cached.checked_at,
                    "Cache expired, checking again"
                );
                self.cache.delete_drift_check_result(&key).await.map_err(|e| {
                    e.context(format!("failed to delete cache value for {}/{}", dir, workspace))
                })?;
            }

            let request = PlanSummaryRequest {
                repo: self.repo.clone(),
                git_ref: self.git_ref.clone(),
                vcs_type: VCS_TYPE.to_string(),
                dir: dir.to_string(),
                workspace: workspace.clone(),
            };
            let result = match self.plans.plan_summary(cancel, &request).await {
                Ok(result) => result,
                Err(e) if e.is_temporary() => {
                    warn!(dir, workspace = %workspace, error = %e, "Temporary error, will try again later");
                    continue;
                }
                Err(e) => {
                    return Err(e.context(format!(
                        "failed to get plan summary for ({}#{})",
                        dir, workspace
                    )))
                }
            };

            if result.is_empty() {
                warn!(dir, workspace = %workspace, "Plan returned no project results");
            }
            let drift = result.has_changes();
            self.cache
                .store_drift_check_result(&key, &DriftCheckValue::new(drift, Utc::now()))
                .await
                .map_err(|e| e.context(format!("failed to store cache value for {}/{}", dir, workspace)))?;

            if result.is_locked() {
                info!(dir, workspace = %workspace, "Plan is locked, skipping drift check");
                continue;
            }
            if drift {
                info!(dir, workspace = %workspace, "Drift detected");
                self.notification
                    .plan_drift(cancel, dir, workspace)
                    .await
                    .map_err(|e| e.context(format!("failed to notify of plan drift in {}", dir)))?;
            }
        }
        Ok(())
    }

    async fn check_directory_workspaces(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspaces: &[String],
    ) -> DriftResult<()> {
        let key = RemoteWorkspacesKey::new(dir);
        let cached = self
            .cache
            .get_remote_workspaces(&key)
            .await
            .map_err(|e| e.context(format!("failed to get cache value for {}", dir)))?;
        if let Some(cached) = cached {
            if self.is_fresh(cached.checked_at, Utc::now()) {
                info!(dir, "Skipping directory, in cache");
                return Ok(());
            }
            info!(dir, checked_at = %cached.checked_at, "Cache expired, checking again");
            self.cache
                .delete_remote_workspaces(&key)
                .await
                .map_err(|e| e.context(format!("failed to delete cache value for {}", dir)))?;
        }

        info!(dir, "Checking for extra workspaces");
        self.terraform
            .init(cancel, dir)
            .await
            .map_err(|e| e.context(format!("failed to init workspace {}", dir)))?;

        let mut expected: HashSet<&str> = workspaces.iter().map(String::as_str).collect();
        expected.insert(DEFAULT_WORKSPACE);

        let remote = self
            .terraform
            .list_workspaces(cancel, dir)
            .await
            .map_err(|e| e.context(format!("failed to list workspaces in {}", dir)))?;

        for workspace in remote.iter().filter(|w| !expected.contains(w.as_str())) {
            self.notification
                .extra_workspace_in_remote(cancel, dir, workspace)
                .await
                .map_err(|e| {
                    e.context(format!("failed to notify of extra workspace {} in {}", workspace, dir))
                })?;
        }

        if self.check_missing_workspaces {
            let present: HashSet<&str> = remote.iter().map(String::as_str).collect();
            for workspace in workspaces
                .iter()
                .filter(|w| w.as_str() != DEFAULT_WORKSPACE && !present.contains(w.as_str()))
            {
                self.notification
                    .missing_workspace_in_remote(cancel, dir, workspace)
                    .await
                    .map_err(|e| {
                        e.context(format!(
                            "failed to notify of missing workspace {} in {}",
                            workspace, dir
                        ))
                    })?;
            }
        }

        self.cache
            .store_remote_workspaces(&key, &RemoteWorkspacesValue::new(remote, Utc::now()))
            .await
            .map_err(|e| e.context(format!("failed to store cache value for {}", dir)))?;
        Ok(())
    }
}

impl std::fmt::Debug for Drifter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drifter")
            .field("repo", &self.repo)
            .field("git_ref", &self.git_ref)
            .field("cache_valid_duration", &self.cache_valid_duration)
            .field("directory_whitelist", &self.directory_whitelist)
            .field("skip_workspace_check", &self.skip_workspace_check)
            .field("check_missing_workspaces", &self.check_missing_workspaces)
            .field("parallel_runs", &self.parallel_runs)
            .finish_non_exhaustive()
    }
}
