//! CI workflow trigger for drifted directories

use crate::error::{DriftError, DriftResult};
use crate::notification::Notification;
use async_trait::async_trait;
use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Workflow to dispatch when a directory drifts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowTarget {
    pub owner: String,
    pub repo: String,
    /// Workflow file name or numeric id
    pub id: String,
    pub git_ref: String,
}

impl WorkflowTarget {
    /// Build a target; `None` unless every part is set
    pub fn new(owner: &str, repo: &str, id: &str, git_ref: &str) -> Option<Self> {
        if owner.is_empty() || repo.is_empty() || id.is_empty() || git_ref.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            id: id.to_string(),
            git_ref: git_ref.to_string(),
        })
    }

    /// `owner/repo` slug
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Starts a workflow run with string inputs
#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        target: &WorkflowTarget,
        inputs: &[(&str, &str)],
    ) -> DriftResult<()>;
}

/// Dispatches through `gh workflow run`
#[derive(Debug, Clone)]
pub struct GhWorkflowDispatcher {
    binary: String,
}

impl Default for GhWorkflowDispatcher {
    fn default() -> Self {
        Self {
            binary: "gh".to_string(),
        }
    }
}

impl GhWorkflowDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different gh executable
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn args(target: &WorkflowTarget, inputs: &[(&str, &str)]) -> Vec<String> {
        let mut args = vec![
            "workflow".to_string(),
            "run".to_string(),
            target.id.clone(),
            "--repo".to_string(),
            target.slug(),
            "--ref".to_string(),
            target.git_ref.clone(),
        ];
        for (name, value) in inputs {
            args.push("-f".to_string());
            args.push(format!("{}={}", name, value));
        }
        args
    }
}

#[async_trait]
impl WorkflowDispatcher for GhWorkflowDispatcher {
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        target: &WorkflowTarget,
        inputs: &[(&str, &str)],
    ) -> DriftResult<()> {
        let args = Self::args(target, inputs);
        let command = format!("{} {}", self.binary, args.join(" "));
        debug!("Executing: {}", command);

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DriftError::command_failed(command.clone(), e))?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DriftError::Cancelled),
            output = child.wait_with_output() => {
                output.map_err(|e| DriftError::command_failed(command.clone(), e))?
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriftError::notify(
                "workflow",
                format!("{} failed: {}", command, stderr.trim()),
            ));
        }
        Ok(())
    }
}

/// Triggers the drift workflow once per directory
pub struct Workflow {
    target: WorkflowTarget,
    dispatcher: Arc<dyn WorkflowDispatcher>,
    directories_done: Mutex<HashSet<String>>,
}

impl Workflow {
    pub fn new(target: WorkflowTarget, dispatcher: Arc<dyn WorkflowDispatcher>) -> Self {
        Self {
            target,
            dispatcher,
            directories_done: Mutex::new(HashSet::new()),
        }
    }

    /// Record `dir` as triggered; false if it already was
    fn claim(&self, dir: &str) -> DriftResult<bool> {
        let mut done = self
            .directories_done
            .lock()
            .map_err(|_| DriftError::Internal("workflow dedup lock poisoned".into()))?;
        Ok(done.insert(dir.to_string()))
    }
}

#[async_trait]
impl Notification for Workflow {
    async fn extra_workspace_in_remote(
        &self,
        _cancel: &CancellationToken,
        _dir: &str,
        _workspace: &str,
    ) -> DriftResult<()> {
        Ok(())
    }

    async fn missing_workspace_in_remote(
        &self,
        _cancel: &CancellationToken,
        _dir: &str,
        _workspace: &str,
    ) -> DriftResult<()> {
        Ok(())
    }

    async fn plan_drift(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        _workspace: &str,
    ) -> DriftResult<()> {
        if !self.claim(dir)? {
            debug!(dir, "Workflow already triggered for directory");
            return Ok(());
        }
        info!(dir, workflow = %self.target.id, "Triggering drift workflow");
        self.dispatcher
            .dispatch(cancel, &self.target, &[("directory", dir)])
            .await
    }
}
