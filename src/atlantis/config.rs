//! Repo-level `atlantis.yaml` parsing

use crate::error::{DriftError, DriftResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// File name Atlantis reads project configuration from
pub const ATLANTIS_YAML_FILENAME: &str = "atlantis.yaml";

/// Workspace used when a project does not name one
pub const DEFAULT_WORKSPACE: &str = "default";

/// Parsed `atlantis.yaml`; keys the drift check has no use for are ignored
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    pub version: u32,
    #[serde(default)]
    pub projects: Vec<Project>,
}

/// One project entry
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: Option<String>,
    pub dir: String,
    #[serde(default = "default_workspace")]
    pub workspace: String,
}

fn default_workspace() -> String {
    DEFAULT_WORKSPACE.to_string()
}

/// Normalize a project directory the way Atlantis does (`./a/b/` -> `a/b`)
pub fn clean_dir(dir: &str) -> String {
    let parts: Vec<&str> = dir
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

impl RepoConfig {
    /// Parse and validate a config body
    pub fn parse(body: &str) -> Result<Self, String> {
        let config: RepoConfig = serde_yaml::from_str(body).map_err(|e| e.to_string())?;
        if !(2..=3).contains(&config.version) {
            return Err(format!("unsupported version {}", config.version));
        }
        if let Some(p) = config.projects.iter().find(|p| p.dir.trim().is_empty()) {
            return Err(format!(
                "project {} has an empty dir",
                p.name.as_deref().unwrap_or("<unnamed>")
            ));
        }
        Ok(config)
    }

    /// Read `atlantis.yaml` from a checkout root
    pub async fn from_dir(dir: &Path) -> DriftResult<Self> {
        let path = dir.join(ATLANTIS_YAML_FILENAME);
        let body = fs::read_to_string(&path)
            .await
            .map_err(|e| DriftError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&body).map_err(|reason| DriftError::RepoConfig { path, reason })
    }
}

/// Directories mapped to the workspaces configured for them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoriesWithWorkspaces(BTreeMap<String, Vec<String>>);

impl DirectoriesWithWorkspaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workspace to a directory, keeping configuration order
    pub fn insert(&mut self, dir: impl Into<String>, workspace: impl Into<String>) {
        let workspace = workspace.into();
        let workspaces = self.0.entry(dir.into()).or_default();
        if !workspaces.contains(&workspace) {
            workspaces.push(workspace);
        }
    }

    /// Workspaces of a directory in configuration order
    pub fn get(&self, dir: &str) -> &[String] {
        self.0.get(dir).map(Vec::as_slice).unwrap_or_default()
    }

    /// Directory names in sorted order
    pub fn sorted_keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&RepoConfig> for DirectoriesWithWorkspaces {
    fn from(config: &RepoConfig) -> Self {
        let mut ws = Self::new();
        for project in &config.projects {
            ws.insert(clean_dir(&project.dir), project.workspace.clone());
        }
        ws
    }
}

impl<D, W> FromIterator<(D, W)> for DirectoriesWithWorkspaces
where
    D: Into<String>,
    W: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (D, W)>>(iter: I) -> Self {
        let mut ws = Self::new();
        for (dir, workspace) in iter {
            ws.insert(dir, workspace);
        }
        ws
    }
}
