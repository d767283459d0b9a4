//! Notification sinks for drift findings
//!
//! Every sink implements [`Notification`]; [`MultiNotification`] fans a
//! finding out to all configured sinks and stops at the first failure.

mod log;
mod slack;
mod workflow;

pub use log::LogNotification;
pub use slack::SlackWebhook;
pub use workflow::{GhWorkflowDispatcher, Workflow, WorkflowDispatcher, WorkflowTarget};

use crate::error::DriftResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Receiver of drift findings
#[async_trait]
pub trait Notification: Send + Sync {
    /// A workspace exists in the backend but not in `atlantis.yaml`
    async fn extra_workspace_in_remote(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()>;

    /// A workspace is configured but absent from the backend
    async fn missing_workspace_in_remote(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()>;

    /// A plan of the default branch reports changes
    async fn plan_drift(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()>;
}

/// Delivers each finding to every sink in order
#[derive(Default, Clone)]
pub struct MultiNotification {
    sinks: Vec<Arc<dyn Notification>>,
}

impl MultiNotification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sink
    pub fn push(&mut self, sink: Arc<dyn Notification>) {
        self.sinks.push(sink);
    }

    /// Builder form of [`push`](Self::push)
    pub fn with(mut self, sink: Arc<dyn Notification>) -> Self {
        self.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl Notification for MultiNotification {
    async fn extra_workspace_in_remote(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        for sink in &self.sinks {
            sink.extra_workspace_in_remote(cancel, dir, workspace).await?;
        }
        Ok(())
    }

    async fn missing_workspace_in_remote(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        for sink in &self.sinks {
            sink.missing_workspace_in_remote(cancel, dir, workspace).await?;
        }
        Ok(())
    }

    async fn plan_drift(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        for sink in &self.sinks {
            sink.plan_drift(cancel, dir, workspace).await?;
        }
        Ok(())
    }
}
