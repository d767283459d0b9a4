//! Terraform CLI wrapper for listing remote workspaces

use crate::error::{DriftError, DriftResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Access to the workspaces that exist in a directory's state backend
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Initialize the directory so its backend can be queried
    async fn init(&self, cancel: &CancellationToken, dir: &str) -> DriftResult<()>;

    /// List workspaces present in the backend
    async fn list_workspaces(&self, cancel: &CancellationToken, dir: &str)
        -> DriftResult<Vec<String>>;
}

/// Parse `terraform workspace list` output
///
/// The current workspace is prefixed with `* `; blank lines are dropped.
pub fn parse_workspace_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|line| line.strip_prefix("* ").unwrap_or(line).trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runs the terraform binary inside directories of a checkout
#[derive(Debug, Clone)]
pub struct TerraformClient {
    root: PathBuf,
    binary: String,
}

impl TerraformClient {
    /// Create a client for directories relative to `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            binary: "terraform".to_string(),
        }
    }

    /// Use a different terraform executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Checkout root the client operates in
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute terraform in `dir`, returning stdout on success
    async fn exec(&self, cancel: &CancellationToken, dir: &str, args: &[&str]) -> DriftResult<String> {
        let command = format!("{} {}", self.binary, args.join(" "));
        let workdir = self.root.join(dir);
        debug!("Executing: {} in {}", command, workdir.display());

        let child = Command::new(&self.binary)
            .args(args)
            .current_dir(&workdir)
            .env("TF_IN_AUTOMATION", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriftError::command_failed(command.clone(), e))?;

        // Dropping the pending output future kills the child
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DriftError::Cancelled),
            output = child.wait_with_output() => {
                output.map_err(|e| DriftError::command_failed(command.clone(), e))?
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(DriftError::command_exec(command, stdout, stderr))
        }
    }
}

#[async_trait]
impl WorkspaceClient for TerraformClient {
    async fn init(&self, cancel: &CancellationToken, dir: &str) -> DriftResult<()> {
        info!(dir, "Initializing terraform");
        self.exec(cancel, dir, &["init", "-no-color", "-input=false"])
            .await
            .map(|_| ())
    }

    async fn list_workspaces(
        &self,
        cancel: &CancellationToken,
        dir: &str,
    ) -> DriftResult<Vec<String>> {
        info!(dir, "Listing workspaces");
        let stdout = self.exec(cancel, dir, &["workspace", "list"]).await?;
        Ok(parse_workspace_list(&stdout))
    }
}
