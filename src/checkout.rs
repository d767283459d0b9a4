//! Repository checkout for a drift run
//!
//! Clones a shallow copy of the GitHub repo into a temporary directory, or
//! wraps an existing local checkout that is left untouched.

use crate::error::{DriftError, DriftResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A working tree the scans read `atlantis.yaml` and terraform code from
#[derive(Debug)]
pub struct Checkout {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl Checkout {
    /// Use a checkout that already exists on disk
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temp: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the checkout is deleted by [`close`](Self::close)
    pub fn is_temporary(&self) -> bool {
        self.temp.is_some()
    }

    /// Remove a temporary checkout; failures are only logged
    pub fn close(self) {
        if let Some(temp) = self.temp {
            let location = temp.path().display().to_string();
            match temp.close() {
                Ok(()) => debug!("Removed checkout {}", location),
                Err(e) => warn!(error = %e, "Failed to clean up checkout {}", location),
            }
        }
    }
}

/// HTTPS clone URL authenticating with an installation or user token
pub fn clone_url(repo: &str, token: &str) -> String {
    format!("https://x-access-token:{}@github.com/{}.git", token, repo)
}

/// Strip a secret from text that may end up in logs or errors
fn redact(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        text.to_string()
    } else {
        text.replace(secret, "***")
    }
}

/// Clones repositories with the git CLI
#[derive(Debug, Clone)]
pub struct GitCloner {
    binary: String,
}

impl Default for GitCloner {
    fn default() -> Self {
        Self {
            binary: "git".to_string(),
        }
    }
}

impl GitCloner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different git executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Shallow-clone `repo` (`owner/name`) into a fresh temporary directory
    pub async fn clone_repo(
        &self,
        cancel: &CancellationToken,
        repo: &str,
        token: &str,
    ) -> DriftResult<Checkout> {
        let temp = tempfile::Builder::new()
            .prefix("atlantis-drift-")
            .tempdir()
            .map_err(|e| DriftError::io("creating checkout directory", e))?;
        let target = temp.path().join("repo");
        let url = clone_url(repo, token);

        info!(repo, "Cloning repository");
        debug!("Cloning into {}", target.display());

        let child = Command::new(&self.binary)
            .arg("clone")
            .args(["--depth", "1", "--quiet"])
            .arg(&url)
            .arg(&target)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriftError::command_failed(format!("{} clone", self.binary), e))?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DriftError::Cancelled),
            output = child.wait_with_output() => output
                .map_err(|e| DriftError::command_failed(format!("{} clone", self.binary), e))?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriftError::Checkout {
                repo: repo.to_string(),
                reason: redact(stderr.trim(), token),
            });
        }

        Ok(Checkout {
            path: target,
            temp: Some(temp),
        })
    }
}

/// Token used to clone: the configured one, else `gh auth token`
pub async fn github_token(repo: &str, configured: Option<&str>) -> DriftResult<String> {
    if let Some(token) = configured.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    debug!("Getting GitHub token from gh CLI...");
    let output = Command::new("gh")
        .args(["auth", "token"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| DriftError::command_failed("gh auth token", e))?;

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() || token.is_empty() {
        return Err(DriftError::Checkout {
            repo: repo.to_string(),
            reason: "no GitHub token available".to_string(),
        });
    }
    Ok(token)
}
