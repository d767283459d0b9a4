//! Configuration schema for atlantis-drift
//!
//! Configuration is read from `~/.config/atlantis-drift/config.toml` (or the
//! `--config` path); flags and environment variables override it.

use crate::atlantis::config::clean_dir;
use crate::error::{DriftError, DriftResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder printed instead of secrets
pub const REDACTED: &str = "***";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Atlantis server settings
    pub atlantis: AtlantisConfig,

    /// Repository under watch
    pub repo: RepoConfig,

    /// Scan behaviour
    pub scan: ScanConfig,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Notification targets
    pub notification: NotificationConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Atlantis server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlantisConfig {
    /// Base URL including scheme
    pub host: String,

    /// API secret sent as `X-Atlantis-Token`
    pub token: String,

    /// Ref planned as the desired state
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl Default for AtlantisConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            token: String::new(),
            git_ref: "master".to_string(),
        }
    }
}

/// Repository settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// GitHub `owner/name`
    pub name: String,

    /// Only scan these directories (empty = all)
    pub directory_whitelist: Vec<String>,

    /// Use this checkout instead of cloning
    pub local_dir: Option<PathBuf>,

    /// Token for cloning; falls back to `gh auth token`
    pub github_token: Option<String>,
}

/// Scan settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Directories checked concurrently (1 = sequential)
    pub parallel_runs: usize,

    /// Skip the remote workspace comparison
    pub skip_workspace_check: bool,

    /// Report configured workspaces missing from the backend
    pub check_missing_workspaces: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parallel_runs: 1,
            skip_workspace_check: false,
            check_missing_workspaces: false,
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Table name; unset keeps every run cold
    pub table: Option<String>,

    /// Directory holding cache tables
    pub dir: Option<PathBuf>,

    /// How long a stored check is trusted
    #[serde(with = "humantime_serde")]
    pub valid_duration: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            table: None,
            dir: None,
            valid_duration: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Notification targets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Slack incoming webhook
    pub slack_webhook_url: Option<String>,

    /// GitHub Actions workflow to dispatch on drift
    pub workflow: WorkflowConfig,
}

/// Workflow dispatch target; all fields must be set to enable it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub owner: String,
    pub repo: String,
    pub id: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl Config {
    /// Check that a run has everything it needs
    pub fn validate(&self) -> DriftResult<()> {
        if self.repo.name.trim().is_empty() {
            return Err(DriftError::ConfigMissing("repo is required (--repo / REPO)".into()));
        }
        if self.atlantis.host.trim().is_empty() {
            return Err(DriftError::ConfigMissing(
                "atlantis host is required (--atlantis-host / ATLANTIS_HOST)".into(),
            ));
        }
        if !self.atlantis.host.starts_with("http://") && !self.atlantis.host.starts_with("https://")
        {
            return Err(DriftError::ConfigMissing(format!(
                "atlantis host must start with http:// or https://, got {}",
                self.atlantis.host
            )));
        }
        if self.atlantis.token.is_empty() {
            return Err(DriftError::ConfigMissing(
                "atlantis token is required (--atlantis-token / ATLANTIS_TOKEN)".into(),
            ));
        }
        if self.cache.valid_duration.is_zero() {
            return Err(DriftError::ConfigMissing(
                "cache valid duration must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Anchor relative paths at `base` (the config file's directory) and
    /// rewrite whitelist entries the way `atlantis.yaml` directories are read
    pub fn normalized(mut self, base: &Path) -> Config {
        for dir in [&mut self.cache.dir, &mut self.repo.local_dir]
            .into_iter()
            .flatten()
        {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        self.repo.directory_whitelist = normalize_whitelist(&self.repo.directory_whitelist);
        self
    }

    /// Copy with secrets replaced, for display
    pub fn redacted(&self) -> Config {
        let mut config = self.clone();
        if !config.atlantis.token.is_empty() {
            config.atlantis.token = REDACTED.to_string();
        }
        if config.repo.github_token.is_some() {
            config.repo.github_token = Some(REDACTED.to_string());
        }
        if config.notification.slack_webhook_url.is_some() {
            config.notification.slack_webhook_url = Some(REDACTED.to_string());
        }
        config
    }
}

/// Trimmed, cleaned and deduplicated whitelist entries; blanks are dropped
pub fn normalize_whitelist(entries: &[String]) -> Vec<String> {
    let mut dirs: Vec<String> = Vec::new();
    for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        let dir = clean_dir(entry);
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
