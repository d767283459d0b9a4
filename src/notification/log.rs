//! Notification sink that writes findings to the log

use crate::error::DriftResult;
use crate::notification::Notification;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Emits one structured log event per finding
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotification;

#[async_trait]
impl Notification for LogNotification {
    async fn extra_workspace_in_remote(
        &self,
        _cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        info!(notification = true, dir, workspace, "Extra workspace in remote");
        Ok(())
    }

    async fn missing_workspace_in_remote(
        &self,
        _cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        info!(notification = true, dir, workspace, "Missing workspace in remote");
        Ok(())
    }

    async fn plan_drift(
        &self,
        _cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        info!(notification = true, dir, workspace, "Plan has drifted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_fails() {
        let cancel = CancellationToken::new();
        let sink = LogNotification;
        sink.extra_workspace_in_remote(&cancel, "env/a", "old").await.unwrap();
        sink.missing_workspace_in_remote(&cancel, "env/a", "new").await.unwrap();
        sink.plan_drift(&cancel, "env/a", "default").await.unwrap();
    }
}
